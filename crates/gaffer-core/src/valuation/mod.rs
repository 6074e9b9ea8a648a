// Valuation: rolling history features and position-relative Smart Values.

pub mod history;
pub mod smart_value;
