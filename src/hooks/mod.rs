//! Hook plumbing shared by every family.
//!
//! - `types`: `HookEvent` and the parsed event payload
//! - `decision`: the stdout protocol and `PolicyDecision`
//! - `manifest`: registration manifest loading and validation
//! - `dispatcher`: runs registered hooks as subprocesses and aggregates
//! - `registry`: the built-in hooks behind `forge-hooks hook <name>`
//!
//! Entry points: `forge-hooks dispatch <event>` and `forge-hooks hook <name>`,
//! both reading the event JSON from stdin.

pub mod decision;
pub mod dispatcher;
pub mod manifest;
pub mod registry;
pub mod types;
pub mod utils;
