//! Sql rendering for server-side prepared plans.

/// Renders an `EXECUTE` call against a plan installed by a startup
/// `PREPARE` statement.
///
/// Values are substituted lexically into the statement text, the way the
/// surrounding service builds all of its SQL. String literals are
/// single-quoted with embedded quotes doubled.
///
/// ```
/// use pingbase::sql::ExecuteCall;
///
/// let sql = ExecuteCall::new("ping_insert")
///     .arg_text("d1")
///     .arg_int(1700000000)
///     .finish();
/// assert_eq!(sql, "EXECUTE ping_insert('d1', 1700000000)");
/// ```
#[derive(Debug)]
pub struct ExecuteCall {
    sql: String,
    args: usize,
}

impl ExecuteCall {
    pub fn new(plan: &str) -> ExecuteCall {
        Self { sql: format!("EXECUTE {plan}"), args: 0 }
    }

    fn sep(&mut self) {
        self.sql.push_str(if self.args == 0 { "(" } else { ", " });
        self.args += 1;
    }

    /// Append a quoted string literal.
    pub fn arg_text(mut self, value: &str) -> Self {
        self.sep();
        self.sql.push('\'');
        for ch in value.chars() {
            if ch == '\'' {
                self.sql.push('\'');
            }
            self.sql.push(ch);
        }
        self.sql.push('\'');
        self
    }

    /// Append an integer literal.
    pub fn arg_int(mut self, value: i64) -> Self {
        self.sep();
        self.sql.push_str(itoa::Buffer::new().format(value));
        self
    }

    /// Finish rendering. A call without arguments has no parameter list.
    pub fn finish(mut self) -> String {
        if self.args > 0 {
            self.sql.push(')');
        }
        self.sql
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_text_and_int() {
        let sql = ExecuteCall::new("ping_range")
            .arg_text("d1")
            .arg_int(100)
            .arg_int(-200)
            .finish();
        assert_eq!(sql, "EXECUTE ping_range('d1', 100, -200)");
    }

    #[test]
    fn doubles_embedded_quotes() {
        let sql = ExecuteCall::new("ping_insert").arg_text("d'Arc").finish();
        assert_eq!(sql, "EXECUTE ping_insert('d''Arc')");
    }

    #[test]
    fn no_parameter_list_without_args() {
        assert_eq!(ExecuteCall::new("ping_count").finish(), "EXECUTE ping_count");
    }
}
