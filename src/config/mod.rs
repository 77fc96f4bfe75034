//! Per-sheet layout settings: where the field labels are, which rows hold data,
//! and which field identifies a row.

mod range;

use crate::config::range::RowRange;
use std::fmt::Display;
use thiserror::Error;

/// Errors raised while building or applying a sheet configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config for sheet '{sheet}' is missing the property {property}")]
    MissingProperty { sheet: String, property: Property },

    #[error("Sheet '{0}' must be configured before it can be read")]
    NotConfigured(String),

    #[error("Sheet '{0}' is not in the workbook and cannot be made active")]
    UnknownSheet(String),

    #[error("Invalid visible rows {lower}..={upper}: the lower bound must be above 0 and below the upper bound")]
    InvalidVisibleRows { lower: usize, upper: usize },

    #[error("Invalid value '{value}' for property '{name}'")]
    InvalidProperty { name: String, value: String },

    #[error("Invalid row range '{0}'")]
    InvalidRange(String),
}

/// The four settings a sheet needs before it can be queried.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    /// Row holding the field labels
    FieldsRowIndex,
    /// First data row, inclusive
    DataLowerIndex,
    /// Last data row, inclusive
    DataUpperIndex,
    /// Field whose values identify a row
    UniqueIdField,
}

impl Property {
    /// All properties, in declaration order.
    pub const ALL: [Property; 4] = [
        Property::FieldsRowIndex,
        Property::DataLowerIndex,
        Property::DataUpperIndex,
        Property::UniqueIdField,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Property::FieldsRowIndex => "FIELDS_ROW_INDEX",
            Property::DataLowerIndex => "DATA_LOWER_INDEX",
            Property::DataUpperIndex => "DATA_UPPER_INDEX",
            Property::UniqueIdField => "UNIQUE_ID_FIELD",
        }
    }

    /// Parses a property name. Supports the upper-case names and a few short aliases.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "FIELDS_ROW_INDEX" | "FIELDS_ROW" | "HEADER_ROW" => Ok(Self::FieldsRowIndex),
            "DATA_LOWER_INDEX" | "LOWER" => Ok(Self::DataLowerIndex),
            "DATA_UPPER_INDEX" | "UPPER" => Ok(Self::DataUpperIndex),
            "UNIQUE_ID_FIELD" | "UNIQUE_ID" | "UID" => Ok(Self::UniqueIdField),
            _ => Err(ConfigError::InvalidProperty {
                name: name.to_owned(),
                value: String::new(),
            }),
        }
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout of one sheet. Row indexes are 0-based and the data bounds inclusive.
///
/// ```
/// use sheet_query::SheetConfig;
///
/// let config = SheetConfig::new()
///     .with_fields_row(0)
///     .with_data_rows(1, 240)
///     .with_unique_id_field("iso_code");
/// assert!(config.is_complete());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetConfig {
    fields_row_index: Option<usize>,
    data_lower_index: Option<usize>,
    data_upper_index: Option<usize>,
    unique_id_field: Option<String>,
}

impl SheetConfig {
    pub(crate) const EMPTY: SheetConfig = SheetConfig {
        fields_row_index: None,
        data_lower_index: None,
        data_upper_index: None,
        unique_id_field: None,
    };

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields_row(mut self, index: usize) -> Self {
        self.fields_row_index = Some(index);
        self
    }

    pub fn with_data_lower(mut self, index: usize) -> Self {
        self.data_lower_index = Some(index);
        self
    }

    pub fn with_data_upper(mut self, index: usize) -> Self {
        self.data_upper_index = Some(index);
        self
    }

    pub fn with_data_rows(self, lower: usize, upper: usize) -> Self {
        self.with_data_lower(lower).with_data_upper(upper)
    }

    pub fn with_unique_id_field(mut self, field: impl Into<String>) -> Self {
        self.unique_id_field = Some(field.into());
        self
    }

    /// Sets both data bounds from an Excel-style range of 1-based rows, such as
    /// `"2:242"` or `"A2:D242"`. Columns are ignored.
    pub fn with_data_range(self, range: &str) -> Result<Self, ConfigError> {
        let RowRange { lower, upper } = RowRange::try_from(range)?;
        Ok(self.with_data_rows(lower, upper))
    }

    /// Builds a config from key/value pairs such as `("FIELDS_ROW_INDEX", "0")`.
    ///
    /// Keys go through [`Property::parse`]; `DATA_RANGE` (or `range`) is also
    /// accepted and goes through [`SheetConfig::with_data_range`]. Settings that
    /// are not given stay unset.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = SheetConfig::new();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            if key.eq_ignore_ascii_case("DATA_RANGE") || key.eq_ignore_ascii_case("range") {
                config = config.with_data_range(value)?;
                continue;
            }
            let invalid = || ConfigError::InvalidProperty {
                name: key.to_owned(),
                value: value.to_owned(),
            };
            let property = Property::parse(key).map_err(|_| invalid())?;
            config = match property {
                Property::UniqueIdField if value.trim().is_empty() => Err(invalid())?,
                Property::UniqueIdField => config.with_unique_id_field(value.trim()),
                _ => {
                    let index = value.trim().parse::<usize>().map_err(|_| invalid())?;
                    match property {
                        Property::FieldsRowIndex => config.with_fields_row(index),
                        Property::DataLowerIndex => config.with_data_lower(index),
                        _ => config.with_data_upper(index),
                    }
                }
            };
        }
        Ok(config)
    }

    pub fn fields_row_index(&self) -> Option<usize> {
        self.fields_row_index
    }

    pub fn data_lower_index(&self) -> Option<usize> {
        self.data_lower_index
    }

    pub fn data_upper_index(&self) -> Option<usize> {
        self.data_upper_index
    }

    pub fn unique_id_field(&self) -> Option<&str> {
        self.unique_id_field.as_deref()
    }

    pub fn is_set(&self, property: Property) -> bool {
        match property {
            Property::FieldsRowIndex => self.fields_row_index.is_some(),
            Property::DataLowerIndex => self.data_lower_index.is_some(),
            Property::DataUpperIndex => self.data_upper_index.is_some(),
            Property::UniqueIdField => self.unique_id_field.is_some(),
        }
    }

    /// The first unset property, in declaration order.
    pub fn missing_property(&self) -> Option<Property> {
        Property::ALL.into_iter().find(|property| !self.is_set(*property))
    }

    pub fn is_complete(&self) -> bool {
        self.missing_property().is_none()
    }

    /// Returns `(fields row, lower, upper, unique id field)` once every setting is present.
    pub(crate) fn layout(&self) -> Option<(usize, usize, usize, &str)> {
        Some((
            self.fields_row_index?,
            self.data_lower_index?,
            self.data_upper_index?,
            self.unique_id_field.as_deref()?,
        ))
    }

    pub(crate) fn set_visible_rows(&mut self, lower: usize, upper: usize) {
        self.data_lower_index = Some(lower);
        self.data_upper_index = Some(upper);
    }

    pub(crate) fn set_unique_id_field(&mut self, field: &str) {
        self.unique_id_field = Some(field.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names() {
        assert_eq!(Property::parse("FIELDS_ROW_INDEX"), Ok(Property::FieldsRowIndex));
        assert_eq!(Property::parse("data_lower_index"), Ok(Property::DataLowerIndex));
        assert_eq!(Property::parse("Upper"), Ok(Property::DataUpperIndex));
        assert_eq!(Property::parse("uid"), Ok(Property::UniqueIdField));
        assert!(Property::parse("COLOR").is_err());
        assert_eq!(Property::UniqueIdField.to_string(), "UNIQUE_ID_FIELD");
    }

    #[test]
    fn builder_completes_in_any_order() {
        let config = SheetConfig::new().with_unique_id_field("uid").with_fields_row(0);
        assert_eq!(config.missing_property(), Some(Property::DataLowerIndex));
        assert!(!config.is_complete());
        let config = config.with_data_rows(1, 3);
        assert!(config.is_complete());
        assert_eq!(config.layout(), Some((0, 1, 3, "uid")));
    }

    #[test]
    fn missing_property_follows_declaration_order() {
        assert_eq!(SheetConfig::new().missing_property(), Some(Property::FieldsRowIndex));
        let config = SheetConfig::new().with_fields_row(0).with_data_rows(1, 2);
        assert_eq!(config.missing_property(), Some(Property::UniqueIdField));
    }

    #[test]
    fn from_params_reads_property_names() -> Result<(), ConfigError> {
        let config = SheetConfig::from_params([
            ("FIELDS_ROW_INDEX", "0"),
            ("DATA_LOWER_INDEX", "1"),
            ("DATA_UPPER_INDEX", "241"),
            ("UNIQUE_ID_FIELD", "numeric_code"),
        ])?;
        assert_eq!(
            config,
            SheetConfig::new().with_fields_row(0).with_data_rows(1, 241).with_unique_id_field("numeric_code")
        );
        Ok(())
    }

    #[test]
    fn from_params_accepts_ranges() -> Result<(), ConfigError> {
        let config = SheetConfig::from_params(vec![("header_row", "0"), ("range", "A2:D242"), ("uid", "id")])?;
        assert_eq!(config.layout(), Some((0, 1, 241, "id")));
        Ok(())
    }

    #[test]
    fn from_params_rejects_bad_input() {
        assert_eq!(
            SheetConfig::from_params([("FIELDS_ROW_INDEX", "first")]),
            Err(ConfigError::InvalidProperty { name: "FIELDS_ROW_INDEX".to_owned(), value: "first".to_owned() })
        );
        assert_eq!(
            SheetConfig::from_params([("COLOR", "red")]),
            Err(ConfigError::InvalidProperty { name: "COLOR".to_owned(), value: "red".to_owned() })
        );
        assert_eq!(
            SheetConfig::from_params([("UNIQUE_ID_FIELD", " ")]),
            Err(ConfigError::InvalidProperty { name: "UNIQUE_ID_FIELD".to_owned(), value: " ".to_owned() })
        );
        assert_eq!(
            SheetConfig::from_params([("range", "10:2")]),
            Err(ConfigError::InvalidRange("10:2".to_owned()))
        );
    }

    #[test]
    fn with_data_range_is_one_based() -> Result<(), ConfigError> {
        let config = SheetConfig::new().with_data_range("2:4")?;
        assert_eq!((config.data_lower_index(), config.data_upper_index()), (Some(1), Some(3)));
        Ok(())
    }
}
