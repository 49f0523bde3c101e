/// Knobs for a [`CodeBuilder`](super::CodeBuilder)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Compute the maximum stack and locals sizes
    ///
    /// When disabled, the sizes passed to `set_maxs` are used as is. Subroutines are analyzed
    /// either way, since the CFG is part of the result.
    pub compute_maxs: bool,

    /// Collect line numbers attached to labels into a line number table
    pub emit_line_numbers: bool,

    /// Largest method body allowed, in bytes
    ///
    /// The JVM caps this at 65535. Lower values are mostly useful for tests.
    pub max_code_length: usize,
}

impl Settings {
    /// Hard limit on the size of the `code` array of a method
    pub const JVM_MAX_CODE_LENGTH: usize = 65535;
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            compute_maxs: true,
            emit_line_numbers: true,
            max_code_length: Settings::JVM_MAX_CODE_LENGTH,
        }
    }
}
