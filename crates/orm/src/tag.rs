//! Field tag language.
//!
//! A tag is a semicolon-separated list of `key` or `key=value` properties:
//!
//! ```text
//! column=entity_id; primary; auto_increment
//! foreign_key=post_id; order=created DESC, id; limit=10
//! ```
//!
//! Keys are case-insensitive, values may themselves contain `=`, empty
//! properties and unknown keys are ignored. The tag `-` excludes the field
//! from mapping.

use quarry_sql::OrderBy;

/// Parsed field metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTag {
    /// Logical database override for the whole record.
    pub database: Option<String>,
    /// Table override for the whole record.
    pub table: Option<String>,
    /// Column name override.
    pub column: Option<String>,
    /// Part of the primary key.
    pub primary: bool,
    /// Value is generated by the store on insert.
    pub auto_increment: bool,
    /// Foreign-key columns of a relation.
    pub foreign_key: Vec<String>,
    /// Name of a registered filter intersected with a has-many relation.
    pub filter: Option<String>,
    /// Ordering of a has-many relation.
    pub order: Vec<OrderBy>,
    /// Row limit of a has-many relation. Zero means no limit.
    pub limit: u64,
    /// Binary payload stored as base64 text.
    pub base64: bool,
    /// Excluded from default column sets.
    pub skip: bool,
}

impl FieldTag {
    /// Parses a tag. Returns `None` for the exclusion tag `-`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "-" {
            return None;
        }

        let mut tag = Self::default();
        for property in split_list(text, ';') {
            let (key, value) = property.split_once('=').map_or((property, ""), |(key, value)| {
                (key.trim_matches(BLANK), value.trim_matches(BLANK))
            });
            tag.set(key, value);
        }
        Some(tag)
    }

    fn set(&mut self, key: &str, value: &str) {
        match key.to_ascii_lowercase().as_str() {
            "database" => self.database = non_empty(value),
            "table" => self.table = non_empty(value),
            "column" => self.column = non_empty(value),
            "primary" => self.primary = true,
            "auto_increment" => self.auto_increment = true,
            "foreign_key" => {
                self.foreign_key = split_list(value, ',').map(ToString::to_string).collect();
            }
            "filter" => self.filter = non_empty(value),
            "order" => self.order = split_list(value, ',').map(OrderBy::parse).collect(),
            "limit" => self.limit = value.parse().unwrap_or_default(),
            "base64" => self.base64 = true,
            "skip" => self.skip = true,
            _ => {}
        }
    }
}

const BLANK: [char; 2] = [' ', '\t'];

fn split_list(text: &str, separator: char) -> impl Iterator<Item = &str> {
    text.split(separator).map(|part| part.trim_matches(BLANK)).filter(|part| !part.is_empty())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_tag() {
        let text = "database=test_db; table = test_table ; column =entity_id;nullable; primary ;;";
        let tag = FieldTag::parse(text).expect("tag");

        assert_eq!(tag.database.as_deref(), Some("test_db"));
        assert_eq!(tag.table.as_deref(), Some("test_table"));
        assert_eq!(tag.column.as_deref(), Some("entity_id"));
        assert!(tag.primary);
        assert!(!tag.auto_increment);
    }

    #[test]
    fn exclusion() {
        assert_eq!(FieldTag::parse(" - "), None);
        assert_eq!(FieldTag::parse(""), Some(FieldTag::default()));
    }

    #[test]
    fn relation_properties() {
        let tag = FieldTag::parse(
            "FOREIGN_KEY = post_id, lang ; filter=published; order=created desc, id; limit=10",
        )
        .expect("tag");

        assert_eq!(tag.foreign_key, vec!["post_id", "lang"]);
        assert_eq!(tag.filter.as_deref(), Some("published"));
        assert_eq!(tag.order, vec![OrderBy::desc("created"), OrderBy::Column("id".to_string())]);
        assert_eq!(tag.limit, 10);
    }

    #[test]
    fn values_keep_inner_equals() {
        let tag = FieldTag::parse("column=a=b;limit=x;base64;skip;unknown=1").expect("tag");
        assert_eq!(tag.column.as_deref(), Some("a=b"));
        assert_eq!(tag.limit, 0);
        assert!(tag.base64);
        assert!(tag.skip);
    }
}
