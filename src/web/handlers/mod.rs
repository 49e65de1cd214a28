pub mod content;
pub mod history;
pub mod rules;
pub mod status;
