//! Cross-generation config translation.

pub mod v24tov31;
