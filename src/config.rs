use std::time::Duration;

use crate::error::{Result, SwitchError};
use crate::output::DEFAULT_CAPACITY_PACKETS;

/// Maximum number of configured input streams.
pub const MAX_STREAMS: usize = 16;

/// Grace period applied uniformly: the time a freshly started stream gets to
/// produce its first bytes, and the time a running stream may stay silent
/// before it is considered stalled.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Runtime tunables for the switch.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Silence/startup grace period per stream.
    pub grace: Duration,
    /// Output buffer capacity, in whole packets.
    pub out_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            out_capacity: DEFAULT_CAPACITY_PACKETS,
        }
    }
}

/// Splits command-line words into priority-ordered producer command lines.
///
/// Groups are separated by a literal `--`; the first group is rank 0. At least
/// one non-empty group is required and at most [`MAX_STREAMS`] are accepted.
pub fn parse_groups<I>(args: I) -> Result<Vec<Vec<String>>>
where
    I: IntoIterator<Item = String>,
{
    let mut groups: Vec<Vec<String>> = vec![Vec::new()];
    for arg in args {
        if arg == "--" {
            groups.push(Vec::new());
        } else {
            // last() is always present: the vec starts non-empty.
            if let Some(group) = groups.last_mut() {
                group.push(arg);
            }
        }
    }

    if groups.iter().any(Vec::is_empty) {
        return Err(SwitchError::Config(
            "every command group must name a program".into(),
        ));
    }
    if groups.len() > MAX_STREAMS {
        return Err(SwitchError::Config(format!(
            "at most {} streams are supported, {} configured",
            MAX_STREAMS,
            groups.len()
        )));
    }
    Ok(groups)
}
