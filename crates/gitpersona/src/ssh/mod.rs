//! SSH agent integration.
//!
//! Only `ssh-add` and `ssh-keygen -lf` are used; key material never passes
//! through this process.

mod agent;

pub use agent::{AgentKey, SshAgentAdapter, match_loaded_key, parse_key_list};
