use std::collections::HashMap;

/// Field values of one row, in the order the fields were requested.
///
/// Keys are the field names as the caller wrote them; a field requested twice
/// appears once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, String)>,
}

impl Record {
    pub(crate) fn insert(&mut self, field: &str, value: String) {
        match self.entries.iter_mut().find(|(name, _)| name == field) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((field.to_owned(), value)),
        }
    }

    /// Looks a field up by its exact name first, then ignoring case.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .or_else(|| self.entries.iter().find(|(name, _)| name.to_lowercase() == field.to_lowercase()))
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Record> for HashMap<String, String> {
    fn from(record: Record) -> Self {
        record.into_iter().collect()
    }
}
