use crate::config::FieldSpec;
use crate::error::ScrapeError;
use crate::results::{FieldMap, FieldValue, ListItem};
use scraper::{ElementRef, Html, Selector};

/// Parses a CSS selector, reporting failures as configuration errors
pub fn compile_selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::Configuration(format!("invalid selector '{css}': {e}")))
}

/// A field spec with its selector parsed
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub spec: FieldSpec,
    selector: Selector,
}

/// Immutable set of fields, compiled once when a run is configured
#[derive(Debug, Clone)]
pub struct FieldSet {
    fields: Vec<CompiledField>,
}

impl FieldSet {
    pub fn compile(specs: &[FieldSpec]) -> Result<Self, ScrapeError> {
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.name.trim().is_empty() {
                return Err(ScrapeError::Configuration(format!(
                    "field with selector '{}' has no name",
                    spec.selector
                )));
            }
            fields.push(CompiledField {
                selector: compile_selector(&spec.selector)?,
                spec: spec.clone(),
            });
        }
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.spec.name == name)
    }

    /// Extracts every field inside `scope`. Missing matches become
    /// [`FieldValue::Missing`] (or an empty list), never an error.
    pub fn extract(&self, scope: ElementRef<'_>) -> FieldMap {
        self.fields
            .iter()
            .map(|field| {
                let value = extract_value(
                    scope,
                    &field.selector,
                    field.spec.attribute.as_deref(),
                    field.spec.multiple,
                );
                (field.spec.name.clone(), value)
            })
            .collect()
    }
}

/// Where the detail link of a list item lives
#[derive(Debug, Clone)]
pub struct LinkSource {
    selector: Selector,
    attribute: String,
}

impl LinkSource {
    /// Reads the link from the element matched by the `field_name` field,
    /// using the field's own attribute or else `default_attribute`.
    pub fn for_field(
        fields: &FieldSet,
        field_name: &str,
        default_attribute: &str,
    ) -> Result<Self, ScrapeError> {
        let field = fields.get(field_name).ok_or_else(|| {
            ScrapeError::Configuration(format!("detail URL field '{field_name}' is not a list field"))
        })?;
        Ok(Self {
            selector: field.selector.clone(),
            attribute: field
                .spec
                .attribute
                .clone()
                .unwrap_or_else(|| default_attribute.to_string()),
        })
    }

    fn extract(&self, scope: ElementRef<'_>) -> Option<String> {
        scope
            .select(&self.selector)
            .next()
            .and_then(|e| e.value().attr(&self.attribute))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Scans a listing page snapshot into ordered list items
pub fn extract_list_items(
    html: &str,
    container: &Selector,
    fields: &FieldSet,
    link: &LinkSource,
) -> Vec<ListItem> {
    let doc = Html::parse_document(html);

    let items: Vec<ListItem> = doc
        .select(container)
        .map(|scope| ListItem {
            fields: fields.extract(scope),
            detail_url_raw: link.extract(scope),
        })
        .collect();

    ::log::debug!("HTML parser found {} list items", items.len());
    items
}

/// Extracts detail fields scoped to the first `container` match, or `None`
/// when the container is not in the snapshot
pub fn extract_detail(html: &str, container: &Selector, fields: &FieldSet) -> Option<FieldMap> {
    let doc = Html::parse_document(html);
    let scope = doc.select(container).next()?;
    Some(fields.extract(scope))
}

fn extract_value(
    scope: ElementRef<'_>,
    selector: &Selector,
    attribute: Option<&str>,
    multiple: bool,
) -> FieldValue {
    if multiple {
        let values = scope
            .select(selector)
            .filter_map(|e| element_value(e, attribute))
            .collect();
        return FieldValue::List(values);
    }

    scope
        .select(selector)
        .next()
        .and_then(|e| element_value(e, attribute))
        .map(FieldValue::Text)
        .unwrap_or(FieldValue::Missing)
}

fn element_value(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(name) => element.value().attr(name).map(|v| v.trim().to_string()),
        None => Some(element.text().collect::<String>().trim().to_string()),
    }
}
