//! End-to-end scenarios through the `Consilium` facade.

mod consult_scenarios;
mod support;
