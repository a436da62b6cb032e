use tally_core::SqlWriter;

/// Backtick dialect.
#[derive(Default, Clone, Copy)]
pub struct MySQLSqlWriter {}

impl MySQLSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for MySQLSqlWriter {
    /// Names are trusted: embedded backticks are not escaped.
    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('`');
        out.push_str(value);
        out.push('`');
    }

    fn write_value_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        let mut position = 0;
        for (i, c) in value.char_indices() {
            let escaped = match c {
                '\0' => "\\0",
                '\x08' => "\\b",
                '\t' => "\\t",
                '\n' => "\\n",
                '\r' => "\\r",
                '\x1a' => "\\Z",
                '"' => "\\\"",
                '\'' => "\\'",
                '\\' => "\\\\",
                _ => continue,
            };
            out.push_str(&value[position..i]);
            out.push_str(escaped);
            position = i + 1;
        }
        out.push_str(&value[position..]);
        out.push('\'');
    }
}
