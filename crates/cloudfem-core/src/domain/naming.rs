//! Name helpers: unique names and bucket-safe names.

/// Longest bucket name the compute service accepts.
pub const MAX_BUCKET_NAME_LEN: usize = 250;

/// Append the smallest number that makes `name` differ from every taken name.
///
/// `make_unique_name(&["run"], "run")` -> `run1`.
pub fn make_unique_name<S: AsRef<str>>(taken: &[S], name: &str) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);
    if !is_taken(name) {
        return name.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{name}{i}");
        if !is_taken(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// Turn `name` into a valid, unique bucket name.
///
/// Every character outside `[a-zA-Z0-9]` becomes `_`, the result is cut to
/// [`MAX_BUCKET_NAME_LEN`] and then made unique against `taken`.
pub fn rectify_bucket_name<S: AsRef<str>>(taken: &[S], name: &str) -> String {
    let rectified: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_BUCKET_NAME_LEN)
        .collect();
    make_unique_name(taken, &rectified)
}
