//! System instruction loading.

use anyhow::Context;
use std::{fs, path::Path};
use tracing::info;

const SYSTEM_INSTRUCTION_FILE: &str = "system_instruction.md";

/// The built-in Cubby Storage agent instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = include_str!("../prompts/system_instruction.md");

/// Returns the system instruction for new upstream sessions.
///
/// With a prompts directory configured, `system_instruction.md` inside it must
/// exist and is used verbatim. Without one, the built-in instruction is used.
pub fn load_system_instruction(prompts_path: Option<&Path>) -> anyhow::Result<String> {
    let Some(dir) = prompts_path else {
        return Ok(DEFAULT_SYSTEM_INSTRUCTION.to_string());
    };
    let path = dir.join(SYSTEM_INSTRUCTION_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read system instruction from {}", path.display()))?;
    info!(path = %path.display(), "Loaded system instruction");
    Ok(content)
}
