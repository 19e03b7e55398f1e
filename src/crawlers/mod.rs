pub mod detail;
pub mod orchestrator;
pub mod paginator;
pub mod session;
pub mod web;

#[cfg(test)]
mod tests;

pub use detail::DetailFetcher;
pub use orchestrator::{Orchestrator, PageObserver, Phase, RunOutcome, StartPoint};
pub use paginator::{PageStrategy, Paginator};
pub use session::Session;
pub use web::WebDriverSession;
