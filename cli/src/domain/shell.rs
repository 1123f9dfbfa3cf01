//! POSIX shell quoting for command strings sent to remote shells.

/// Quote one argument so a POSIX shell reads it back verbatim.
///
/// Arguments made only of safe characters are returned unchanged; everything
/// else is wrapped in single quotes with embedded quotes escaped as `'\''`.
#[must_use]
pub fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%^".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Join arguments into one shell-escaped command string.
#[must_use]
pub fn join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
