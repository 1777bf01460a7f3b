use crate::FieldValue;
use std::collections::BTreeMap;

/// Field values held for a single block.
///
/// Two separate namespaces are kept:
/// - **xblock fields**: raw values copied from the content store at build
///   time (e.g. `visible_to_staff_only`, `start`).
/// - **transformer fields**: values derived by a transformer during its
///   collect phase, keyed by transformer name first so that two transformers
///   can collect similarly named data without colliding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockData {
    pub(crate) xblock_fields: BTreeMap<String, FieldValue>,
    pub(crate) transformer_fields: BTreeMap<String, BTreeMap<String, FieldValue>>,
}

impl BlockData {
    pub fn xblock_fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.xblock_fields
    }

    /// Derived values, keyed by transformer name then field name.
    pub fn transformer_fields(&self) -> &BTreeMap<String, BTreeMap<String, FieldValue>> {
        &self.transformer_fields
    }

    pub fn is_empty(&self) -> bool {
        self.xblock_fields.is_empty() && self.transformer_fields.is_empty()
    }
}
