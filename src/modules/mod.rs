//! Built-in modules.

mod single_signer;

pub use single_signer::{SINGLE_SIGNER_MODULE_ID, SingleSignerValidation};
