use crate::error::{HostedFieldsError, Result};
use serde::Deserialize;
use std::io::Read;

/// What the customer did to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Input,
    Focus,
    Blur,
    Clear,
}

/// One recorded customer interaction.
///
/// `field` is kept as written so unknown names can be reported per row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Edit {
    pub field: String,
    pub action: EditAction,
    #[serde(default)]
    pub value: Option<String>,
}

/// Reads a replayable edit script from a CSV source.
///
/// Whitespace is trimmed and the `value` column may be left off entirely.
pub struct EditReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EditReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes edits in file order.
    pub fn edits(self) -> impl Iterator<Item = Result<Edit>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(HostedFieldsError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "field, action, value\nnumber, input, 4111 1111\ncvv, focus\ncvv, clear,";
        let edits: Vec<Result<Edit>> = EditReader::new(data.as_bytes()).edits().collect();

        assert_eq!(edits.len(), 3);
        let first = edits[0].as_ref().unwrap();
        assert_eq!(first.field, "number");
        assert_eq!(first.action, EditAction::Input);
        assert_eq!(first.value.as_deref(), Some("4111 1111"));

        let focus = edits[1].as_ref().unwrap();
        assert_eq!(focus.action, EditAction::Focus);
        assert_eq!(focus.value, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "field, action, value\nnumber, paste, 4111";
        let edits: Vec<Result<Edit>> = EditReader::new(data.as_bytes()).edits().collect();

        assert!(edits[0].is_err());
    }
}
