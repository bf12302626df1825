/// Function Synthesizer
///
/// Turns a Submission (name, parameter declarations, body text) into a unit
/// definition the script engine can compile:
///
/// ```text
/// fn <name>(<p1>, ..., <pn>) {
/// <body>
/// }
/// ```
///
/// Declarations are either an untyped identifier (`a`) or a type followed by an
/// identifier (`int a`, `List<Integer> xs`). The type is kept beside the unit for
/// argument binding; the script itself is untyped.
///
/// No syntax checking happens here. A broken body or identifier surfaces as a
/// load error when the engine compiles the unit.

use grader_common::types::Submission;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared parameter type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Char,
    String,
    /// Fixed-size array (`int[]`)
    Array(Box<ParamType>),
    /// Growable list (`List<T>`, `array<T>`)
    List(Box<ParamType>),
    /// String-keyed map (`Map<String, V>`)
    Map(Box<ParamType>),
    Any,
    /// Type name the grader does not know
    Unknown(String),
}

impl ParamType {
    /// Parse a type as written in a declaration
    pub fn parse(text: &str) -> Self {
        let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        if let Some(element) = text.strip_suffix("[]") {
            return ParamType::Array(Box::new(ParamType::parse(element)));
        }

        if let Some((base, args)) = split_generic(&text) {
            let args = split_top_level(args);
            return match base.to_lowercase().as_str() {
                "list" | "arraylist" | "linkedlist" | "array" | "vec" => {
                    ParamType::List(Box::new(element_type(args.first())))
                }
                "map" | "hashmap" | "linkedhashmap" | "treemap" => {
                    // Map<K, V> keeps V; map<V> names the value type only
                    ParamType::Map(Box::new(element_type(args.last())))
                }
                _ => ParamType::Unknown(text.clone()),
            };
        }

        match text.as_str() {
            "int" | "Integer" | "integer" | "short" | "Short" | "byte" | "Byte" => ParamType::Int,
            "long" | "Long" => ParamType::Long,
            "float" | "Float" => ParamType::Float,
            "double" | "Double" | "number" => ParamType::Double,
            "boolean" | "Boolean" | "bool" => ParamType::Boolean,
            "char" | "Character" => ParamType::Char,
            "String" | "string" | "str" => ParamType::String,
            "List" | "ArrayList" | "list" | "array" => ParamType::List(Box::new(ParamType::Any)),
            "Map" | "HashMap" | "map" => ParamType::Map(Box::new(ParamType::Any)),
            "Object" | "any" | "var" => ParamType::Any,
            _ => ParamType::Unknown(text.clone()),
        }
    }

    /// First unknown type name found in this type, if any
    pub fn unknown_name(&self) -> Option<&str> {
        match self {
            ParamType::Unknown(name) => Some(name),
            ParamType::Array(inner) | ParamType::List(inner) | ParamType::Map(inner) => {
                inner.unknown_name()
            }
            _ => None,
        }
    }
}

fn element_type(arg: Option<&&str>) -> ParamType {
    arg.map(|a| ParamType::parse(a)).unwrap_or(ParamType::Any)
}

/// `List<Integer>` -> ("List", "Integer")
fn split_generic(text: &str) -> Option<(&str, &str)> {
    let open = text.find('<')?;
    let inner = text.strip_suffix('>')?;
    Some((&text[..open], &inner[open + 1..]))
}

/// Split generic arguments on commas that are not nested in angle brackets
fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in args.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Int => f.write_str("int"),
            ParamType::Long => f.write_str("long"),
            ParamType::Float => f.write_str("float"),
            ParamType::Double => f.write_str("double"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::Char => f.write_str("char"),
            ParamType::String => f.write_str("String"),
            ParamType::Array(inner) => write!(f, "{}[]", inner),
            ParamType::List(inner) => write!(f, "List<{}>", inner),
            ParamType::Map(inner) => write!(f, "Map<String, {}>", inner),
            ParamType::Any => f.write_str("Object"),
            ParamType::Unknown(name) => f.write_str(name),
        }
    }
}

/// One parameter of the synthesized function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// None for an untyped declaration
    pub ty: Option<ParamType>,
}

impl Param {
    /// Parse `int a`, `List<Integer> xs` or a bare `a`
    pub fn parse(declaration: &str) -> Self {
        let declaration = declaration.trim();
        match declaration.rfind(char::is_whitespace) {
            Some(split) => Self {
                name: declaration[split..].trim().to_string(),
                ty: Some(ParamType::parse(&declaration[..split])),
            },
            None => Self {
                name: declaration.to_string(),
                ty: None,
            },
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{} {}", ty, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Callable unit ready to be loaded by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Name of the function the runner invokes
    pub entry: String,
    pub params: Vec<Param>,
    /// Complete script source
    pub source: String,
}

impl UnitDefinition {
    /// Human-readable signature, e.g. `add(int a, int b)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.entry, params.join(", "))
    }
}

/// Build the unit definition for a submission
pub fn synthesize(submission: &Submission) -> UnitDefinition {
    let params: Vec<Param> = submission.parameters.iter().map(|d| Param::parse(d)).collect();
    let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();

    let source = format!(
        "fn {}({}) {{\n{}\n}}\n",
        submission.name.trim(),
        names.join(", "),
        submission.body
    );

    UnitDefinition {
        entry: submission.name.trim().to_string(),
        params,
        source,
    }
}
