//! Checkpoint file naming: `{model_name}_epoch{N}.{ext}`.

/// Separator between the model name and the epoch number.
const EPOCH_MARKER: &str = "_epoch";

/// Default file name for `epoch`, zero-padded to `width` digits.
pub fn checkpoint_file_name(model_name: &str, epoch: u64, width: usize, extension: &str) -> String {
    if extension.is_empty() {
        format!("{model_name}{EPOCH_MARKER}{epoch:0width$}")
    } else {
        format!("{model_name}{EPOCH_MARKER}{epoch:0width$}.{extension}")
    }
}

/// Epoch number encoded in `file_name`, if it follows the naming convention
/// for `model_name`.
///
/// Accepts any padding width, so both `model_epoch9.ckpt` and
/// `model_epoch000010.ckpt` parse.
pub fn parse_epoch(model_name: &str, file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(model_name)?.strip_prefix(EPOCH_MARKER)?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, tail) = rest.split_at(digits_end);
    if digits.is_empty() || !(tail.is_empty() || tail.starts_with('.')) {
        return None;
    }
    digits.parse().ok()
}

/// A model name must be usable as a file name prefix.
pub fn validate_model_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("model_name must not be empty".to_string());
    }
    if name.starts_with('.') {
        return Err(format!("model_name '{name}' must not start with '.'"));
    }
    if name.contains(['/', '\\']) {
        return Err(format!("model_name '{name}' must not contain path separators"));
    }
    Ok(())
}

/// A caller-supplied checkpoint file name must stay inside the checkpoint dir.
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("invalid checkpoint file name '{name}'"));
    }
    if name.contains(['/', '\\']) {
        return Err(format!(
            "checkpoint file name '{name}' must not contain path separators"
        ));
    }
    Ok(())
}
