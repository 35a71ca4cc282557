//! Canonical printing of parsed requests.
//!
//! Two requests that differ only in whitespace, comments, commas or
//! shorthand print identically, which makes the output usable as a cache key.

use crate::ast::*;

/// Formatting options.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Number of spaces for indentation.
    pub indent_size: usize,
    /// Use tabs instead of spaces.
    pub use_tabs: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent_size: 2,
            use_tabs: false,
        }
    }
}

/// Request formatter.
pub struct Formatter {
    options: FormatOptions,
    output: String,
    indent: usize,
}

impl Formatter {
    /// Creates a new formatter.
    #[must_use]
    pub fn new(options: FormatOptions) -> Self {
        Self {
            options,
            output: String::new(),
            indent: 0,
        }
    }

    /// Formats an operation.
    pub fn format(&mut self, operation: &Operation) -> String {
        self.output.clear();
        self.indent = 0;

        self.output.push_str(operation.kind.as_str());
        if let Some(name) = &operation.name {
            self.output.push(' ');
            self.output.push_str(name.as_str());
        }
        if !operation.variables.is_empty() {
            if operation.name.is_none() {
                self.output.push(' ');
            }
            self.output.push('(');
            for (i, var) in operation.variables.iter().enumerate() {
                if i > 0 {
                    self.output.push_str(", ");
                }
                self.output.push('$');
                self.output.push_str(var.name.as_str());
                self.output.push_str(": ");
                self.format_type(&var.ty);
                if let Some(default) = &var.default_value {
                    self.output.push_str(" = ");
                    self.format_value(default);
                }
            }
            self.output.push(')');
        }
        self.output.push(' ');
        self.format_selection(&operation.selection);

        std::mem::take(&mut self.output)
    }

    fn format_selection(&mut self, fields: &[RequestedField]) {
        self.output.push_str("{\n");
        self.indent += 1;
        for field in fields {
            self.push_indent();
            self.format_field(field);
            self.output.push('\n');
        }
        self.indent -= 1;
        self.push_indent();
        self.output.push('}');
    }

    fn format_field(&mut self, field: &RequestedField) {
        if let Some(alias) = &field.alias {
            self.output.push_str(alias.as_str());
            self.output.push_str(": ");
        }
        self.output.push_str(field.name.as_str());
        self.format_arguments(&field.arguments);
        for directive in &field.directives {
            self.output.push_str(" @");
            self.output.push_str(directive.name.as_str());
            self.format_arguments(&directive.arguments);
        }
        if field.has_selection() {
            self.output.push(' ');
            self.format_selection(&field.selection);
        }
    }

    fn format_arguments(&mut self, arguments: &[Argument]) {
        if arguments.is_empty() {
            return;
        }
        self.output.push('(');
        for (i, arg) in arguments.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.output.push_str(arg.name.as_str());
            self.output.push_str(": ");
            self.format_value(&arg.value);
        }
        self.output.push(')');
    }

    fn format_type(&mut self, ty: &TypeAnnotation) {
        match ty {
            TypeAnnotation::Named(name) => self.output.push_str(name.as_str()),
            TypeAnnotation::List(inner, _) => {
                self.output.push('[');
                self.format_type(inner);
                self.output.push(']');
            }
            TypeAnnotation::NonNull(inner, _) => {
                self.format_type(inner);
                self.output.push('!');
            }
        }
    }

    fn format_value(&mut self, value: &Value) {
        match value {
            Value::Variable(name) => {
                self.output.push('$');
                self.output.push_str(name.as_str());
            }
            Value::Int(n, _) => self.output.push_str(&n.to_string()),
            // Debug keeps the fractional part, so `2.0` does not reparse as an Int.
            Value::Float(n, _) => self.output.push_str(&format!("{n:?}")),
            Value::String(s, _) => self.format_string(s),
            Value::Boolean(b, _) => self.output.push_str(if *b { "true" } else { "false" }),
            Value::Null(_) => self.output.push_str("null"),
            Value::Enum(name) => self.output.push_str(name.as_str()),
            Value::List(items, _) => {
                self.output.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.format_value(item);
                }
                self.output.push(']');
            }
            Value::Object(fields, _) => {
                self.output.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.output.push_str(name.as_str());
                    self.output.push_str(": ");
                    self.format_value(value);
                }
                self.output.push('}');
            }
        }
    }

    fn format_string(&mut self, s: &str) {
        self.output.push('"');
        for c in s.chars() {
            match c {
                '"' => self.output.push_str("\\\""),
                '\\' => self.output.push_str("\\\\"),
                '\n' => self.output.push_str("\\n"),
                '\r' => self.output.push_str("\\r"),
                '\t' => self.output.push_str("\\t"),
                c if c.is_control() => {
                    self.output.push_str(&format!("\\u{:04X}", u32::from(c)));
                }
                c => self.output.push(c),
            }
        }
        self.output.push('"');
    }

    fn push_indent(&mut self) {
        if self.options.use_tabs {
            for _ in 0..self.indent {
                self.output.push('\t');
            }
        } else {
            for _ in 0..(self.indent * self.options.indent_size) {
                self.output.push(' ');
            }
        }
    }
}

/// Formats an operation with default options.
#[must_use]
pub fn format(operation: &Operation) -> String {
    Formatter::new(FormatOptions::default()).format(operation)
}

/// Formats a single value literal.
#[must_use]
pub fn format_value(value: &Value) -> String {
    let mut formatter = Formatter::new(FormatOptions::default());
    formatter.format_value(value);
    formatter.output
}

/// Formats an operation with custom options.
#[must_use]
pub fn format_with_options(operation: &Operation, options: FormatOptions) -> String {
    Formatter::new(options).format(operation)
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_format_value_ignores_spans() {
        let a = parse("{ f(x: {a: [1, 2.5, \"s\"]}) }").unwrap();
        let b = parse("{ f(  x : { a : [ 1 2.5 \"s\" ] } ) }").unwrap();
        let value = |op: &Operation| format_value(&op.selection[0].arguments[0].value);
        assert_eq!(value(&a), value(&b));
        assert_eq!(value(&a), "{a: [1, 2.5, \"s\"]}");
    }

    #[test]
    fn test_format_is_canonical() {
        let a = parse("{people{id,name}}").unwrap();
        let b = parse("query {\n  # everyone\n  people { id name }\n}").unwrap();
        assert_eq!(format(&a), format(&b));
    }

    #[test]
    fn test_format_roundtrips_through_parser() {
        let source = r#"mutation Post($u: String = "ann") { postMessage(message: "say \"hi\"", user: $u, tags: [1, 2.0]) @include(if: true) { id } }"#;
        let once = format(&parse(source).unwrap());
        let twice = format(&parse(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_tabs() {
        let op = parse("{ a { b } }").unwrap();
        let out = format_with_options(
            &op,
            FormatOptions {
                indent_size: 2,
                use_tabs: true,
            },
        );
        assert_eq!(out, "query {\n\ta {\n\t\tb\n\t}\n}");
    }
}
