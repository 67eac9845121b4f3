// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::debug;

/// Default priority of sample loader threads when POLYSAMPLER_LOADER_PRIORITY
/// is unset. Loaders must never compete with the audio callback.
const DEFAULT_LOADER_THREAD_PRIORITY: u8 = 20;

/// Reads POLYSAMPLER_LOADER_PRIORITY (0-99).
pub fn loader_thread_priority() -> ThreadPriority {
    std::env::var("POLYSAMPLER_LOADER_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_LOADER_THREAD_PRIORITY)
        .try_into()
        .map(|value: ThreadPriorityValue| ThreadPriority::Crossplatform(value))
        .unwrap_or(ThreadPriority::Min)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Lowers the priority of the calling loader thread. Opt out with
/// POLYSAMPLER_KEEP_LOADER_PRIORITY=1.
pub fn configure_loader_thread_priority(index: usize) {
    if env_flag("POLYSAMPLER_KEEP_LOADER_PRIORITY") {
        return;
    }
    if let Err(e) = set_current_thread_priority(loader_thread_priority()) {
        debug!(thread = index, error = ?e, "Failed to lower loader thread priority");
    }
}

#[cfg(test)]
mod test {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_loader_thread_priority() {
        std::env::remove_var("POLYSAMPLER_LOADER_PRIORITY");
        let default: ThreadPriorityValue = DEFAULT_LOADER_THREAD_PRIORITY.try_into().unwrap();
        assert_eq!(ThreadPriority::Crossplatform(default), loader_thread_priority());

        std::env::set_var("POLYSAMPLER_LOADER_PRIORITY", "5");
        let five: ThreadPriorityValue = 5u8.try_into().unwrap();
        assert_eq!(ThreadPriority::Crossplatform(five), loader_thread_priority());

        std::env::set_var("POLYSAMPLER_LOADER_PRIORITY", "250");
        assert_eq!(ThreadPriority::Crossplatform(default), loader_thread_priority());
        std::env::remove_var("POLYSAMPLER_LOADER_PRIORITY");
    }

    #[test]
    #[serial]
    fn test_env_flag() {
        std::env::set_var("POLYSAMPLER_TEST_FLAG", "Yes");
        assert!(env_flag("POLYSAMPLER_TEST_FLAG"));
        std::env::set_var("POLYSAMPLER_TEST_FLAG", "0");
        assert!(!env_flag("POLYSAMPLER_TEST_FLAG"));
        std::env::remove_var("POLYSAMPLER_TEST_FLAG");
        assert!(!env_flag("POLYSAMPLER_TEST_FLAG"));
    }
}
