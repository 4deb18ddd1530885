//! Column naming templates.
//!
//! Templates use `$name` / `${name}` placeholders (`$$` is a literal `$`) and
//! resolve per (catchment, functional unit, constituent) to a data-source
//! column name. Only `fu`, `sc`, `scix` and `con` are recognised; anything
//! else is rejected when the template is parsed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CloeError, CloeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Functional unit name.
    Fu,
    /// Full catchment identifier.
    Sc,
    /// Catchment index, the part after the last `#`.
    Scix,
    /// Constituent name.
    Con,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "fu" => Some(Field::Fu),
            "sc" => Some(Field::Sc),
            "scix" => Some(Field::Scix),
            "con" => Some(Field::Con),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Values substituted into a template for one model element.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub catchment: &'a str,
    pub functional_unit: &'a str,
    pub constituent: &'a str,
}

impl<'a> TemplateVars<'a> {
    pub fn new(catchment: &'a str, functional_unit: &'a str, constituent: &'a str) -> Self {
        Self {
            catchment,
            functional_unit,
            constituent,
        }
    }

    fn value(&self, field: Field) -> &'a str {
        match field {
            Field::Fu => self.functional_unit,
            Field::Sc => self.catchment,
            Field::Scix => catchment_index(self.catchment),
            Field::Con => self.constituent,
        }
    }
}

/// Suffix of a catchment identifier after its last `#` (`SC#12` -> `12`).
pub fn catchment_index(catchment: &str) -> &str {
    catchment
        .rsplit_once('#')
        .map(|(_, index)| index)
        .unwrap_or(catchment)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamingTemplate {
    text: String,
    segments: Vec<Segment>,
}

impl NamingTemplate {
    pub fn parse(text: &str) -> CloeResult<Self> {
        let error = |message: String| CloeError::Template {
            template: text.to_string(),
            message,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            let name = match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                    continue;
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(error(format!("unterminated placeholder at {pos}")));
                    }
                    name
                }
                Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {
                    let mut name = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if c == '_' || c.is_ascii_alphanumeric() {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    name
                }
                _ => return Err(error(format!("invalid placeholder at {pos}"))),
            };

            let field = Field::from_name(&name)
                .ok_or_else(|| error(format!("unknown placeholder '{name}'")))?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(field));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// Produce the concrete column name for one element.
    pub fn resolve(&self, vars: &TemplateVars<'_>) -> String {
        let mut out = String::with_capacity(self.text.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(field) => out.push_str(vars.value(*field)),
            }
        }
        out
    }

    pub fn uses(&self, field: Field) -> bool {
        self.segments.contains(&Segment::Field(field))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NamingTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for NamingTemplate {
    type Error = CloeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NamingTemplate> for String {
    fn from(template: NamingTemplate) -> Self {
        template.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_pivot_template() {
        let template = NamingTemplate::parse("SC#${scix}:${fu}").unwrap();
        let vars = TemplateVars::new("SC#12", "Forest", "TP");
        assert_eq!(template.resolve(&vars), "SC#12:Forest");
    }

    #[test]
    fn resolves_all_fields() {
        let template = NamingTemplate::parse("$con-${sc}/$scix/${fu}").unwrap();
        let vars = TemplateVars::new("SC#7", "Grazing Dairy", "TN");
        assert_eq!(template.resolve(&vars), "TN-SC#7/7/Grazing Dairy");
        assert!(template.uses(Field::Con));
        assert!(template.uses(Field::Scix));
    }

    #[test]
    fn scix_takes_suffix_after_last_hash() {
        assert_eq!(catchment_index("SC#12"), "12");
        assert_eq!(catchment_index("A#B#3"), "3");
        assert_eq!(catchment_index("plain"), "plain");
    }

    #[test]
    fn dollar_escape_is_literal() {
        let template = NamingTemplate::parse("$$${fu}").unwrap();
        let vars = TemplateVars::new("SC#1", "Forest", "TP");
        assert_eq!(template.resolve(&vars), "$Forest");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = NamingTemplate::parse("SC#${index}").unwrap_err();
        assert!(matches!(err, CloeError::Template { .. }));
        assert!(NamingTemplate::parse("${fu").is_err());
        assert!(NamingTemplate::parse("trailing $").is_err());
        // `$fu_x` is a single identifier, not `$fu` followed by `_x`
        assert!(NamingTemplate::parse("$fu_x").is_err());
    }

    #[test]
    fn deserializes_from_json_string() {
        let template: NamingTemplate = serde_json::from_str("\"${sc}:${fu}\"").unwrap();
        assert_eq!(template.as_str(), "${sc}:${fu}");
        assert!(serde_json::from_str::<NamingTemplate>("\"${bad}\"").is_err());
    }
}
