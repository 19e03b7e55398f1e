pub mod html;


pub use html::{
    CompiledField, FieldSet, LinkSource, compile_selector, extract_detail, extract_list_items,
};
