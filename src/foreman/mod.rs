//! Workflow compliance hooks: context frontmatter, agent configs, command
//! chaining, framework drift, skill workflow steps, generated output quality
//! and output archival. Advisory, except that the frontmatter validator
//! denies malformed context files.

pub mod agent_config;
pub mod chain_state;
pub mod drift_detector;
pub mod frontmatter;
pub mod output_archival;
pub mod output_quality;
pub mod skill_compliance;
