//! Vets package-manager install commands against a typosquat deny list.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::decision::PolicyDecision;
use crate::hooks::types::HookInput;
use crate::hooks::utils::{file_name, program_words, split_segments};

/// Typosquats that exist in both ecosystems' attack history.
const SHARED_DENY: &[&str] = &[
    "colourama",
    "requestslib",
    "requsts",
    "requets",
    "reqeusts",
    "urllib4",
    "djago",
    "djnago",
    "fask",
    "flsk",
    "nump",
    "numby",
    "pandsa",
    "ctx",
    "distutils-precedence",
    "pipconfig",
    "python3-dateutil",
];

/// Names that are never legitimate PyPI installs.
const PIP_DENY: &[&str] = &["setup", "pip", "os", "sys", "http", "subprocess", "urllib"];

const NPM_DENY: &[&str] = &[
    "crossenv",
    "cross-env.js",
    "lodahs",
    "loadsh",
    "expresss",
    "exress",
    "recat",
    "babelcli",
    "event-stream-malicious",
    "npm",
    "node",
    "kernel",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Pip,
    Npm,
    NuGet,
}

impl Ecosystem {
    fn label(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Npm => "npm",
            Ecosystem::NuGet => "nuget",
        }
    }

    fn value_flags(&self) -> &'static [&'static str] {
        match self {
            Ecosystem::Pip => PIP_VALUE_FLAGS,
            Ecosystem::Npm => NPM_VALUE_FLAGS,
            Ecosystem::NuGet => NUGET_VALUE_FLAGS,
        }
    }
}

/// Packages requested by one install command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub ecosystem: Ecosystem,
    pub packages: Vec<String>,
}

/// Deny list split by ecosystem. Unprefixed entries apply everywhere.
#[derive(Debug, Default)]
pub struct DenyList {
    any: HashSet<String>,
    pip: HashSet<String>,
    npm: HashSet<String>,
}

impl DenyList {
    pub fn builtin() -> Self {
        let lower = |names: &[&str]| names.iter().map(|n| n.to_lowercase()).collect();
        Self {
            any: lower(SHARED_DENY),
            pip: lower(PIP_DENY),
            npm: lower(NPM_DENY),
        }
    }

    /// Built-ins extended by `<plugin_root>/security/deny_list.txt`.
    pub fn load(plugin_root: &Path) -> Self {
        let mut list = Self::builtin();
        let path = plugin_root.join("security").join("deny_list.txt");
        if let Ok(content) = fs::read_to_string(&path) {
            list.extend_from(&content);
        }
        list
    }

    fn extend_from(&mut self, content: &str) {
        for line in content.lines() {
            let entry = line.split('#').next().unwrap_or("").trim().to_lowercase();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(':') {
                Some(("pip", name)) => self.pip.insert(name.trim().to_string()),
                Some(("npm", name)) => self.npm.insert(name.trim().to_string()),
                _ => self.any.insert(entry),
            };
        }
    }

    pub fn is_denied(&self, ecosystem: Ecosystem, package: &str) -> bool {
        let name = package.to_lowercase();
        self.any.contains(&name)
            || match ecosystem {
                Ecosystem::Pip => self.pip.contains(&name),
                Ecosystem::Npm => self.npm.contains(&name),
                Ecosystem::NuGet => false,
            }
    }
}

pub fn handle(config: &Config, input: &HookInput) -> Result<PolicyDecision, HookError> {
    if input.tool_name() != Some("Bash") {
        return Ok(PolicyDecision::allow());
    }
    let Some(command) = input.command() else {
        return Ok(PolicyDecision::allow());
    };

    let requests = parse_install_commands(command);
    if requests.is_empty() {
        return Ok(PolicyDecision::allow());
    }

    let deny_list = DenyList::load(&config.plugin_root);
    let blocked: Vec<String> = requests
        .iter()
        .flat_map(|req| {
            req.packages
                .iter()
                .filter(|p| deny_list.is_denied(req.ecosystem, p))
                .map(|p| format!("{} ({})", p, req.ecosystem.label()))
                .collect::<Vec<_>>()
        })
        .collect();

    if blocked.is_empty() {
        Ok(PolicyDecision::allow())
    } else {
        Ok(PolicyDecision::deny(format!(
            "Dependency Sentinel: blocked suspicious package(s): {}. These names match known typosquats or malicious packages; verify the intended package name.",
            blocked.join(", ")
        )))
    }
}

/// Every install request in a (possibly chained) command line.
pub fn parse_install_commands(command: &str) -> Vec<InstallRequest> {
    split_segments(command)
        .iter()
        .filter_map(|segment| parse_install(&program_words(segment)))
        .collect()
}

fn parse_install(words: &[String]) -> Option<InstallRequest> {
    let program = file_name(words.first()?);
    let rest = &words[1..];

    let (ecosystem, args) = match program {
        "pip" | "pip3" => (Ecosystem::Pip, subcommand_args(rest, &["install"])?),
        "python" | "python3" => match rest {
            [flag, module, tail @ ..] if flag == "-m" && (module == "pip" || module == "pip3") => {
                (Ecosystem::Pip, subcommand_args(tail, &["install"])?)
            }
            _ => return None,
        },
        "npm" => (Ecosystem::Npm, subcommand_args(rest, &["install", "i", "add"])?),
        "yarn" | "pnpm" => (Ecosystem::Npm, subcommand_args(rest, &["add", "install", "i"])?),
        "dotnet" => (Ecosystem::NuGet, dotnet_args(rest)?),
        _ => return None,
    };

    let packages: Vec<String> = package_names(args, ecosystem)
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    Some(InstallRequest {
        ecosystem,
        packages,
    })
}

/// Arguments following the first non-flag word, if that word is one of
/// `subcommands`.
fn subcommand_args<'a>(words: &'a [String], subcommands: &[&str]) -> Option<&'a [String]> {
    let idx = words.iter().position(|w| !w.starts_with('-'))?;
    subcommands
        .contains(&words[idx].as_str())
        .then(|| &words[idx + 1..])
}

/// `dotnet add [<project>] package <name> [--version x]`.
fn dotnet_args(words: &[String]) -> Option<&[String]> {
    if words.first().map(String::as_str) != Some("add") {
        return None;
    }
    let idx = words.iter().position(|w| w == "package")?;
    words.get(idx + 1).map(|_| &words[idx + 1..idx + 2])
}

/// Flags taking a value that must not be read as a package name. `-v` is
/// verbose (pip) or version (npm) and takes none.
const PIP_VALUE_FLAGS: &[&str] = &[
    "-r",
    "--requirement",
    "-c",
    "--constraint",
    "-e",
    "--editable",
    "-i",
    "--index-url",
    "--extra-index-url",
    "-f",
    "--find-links",
    "-t",
    "--target",
    "--prefix",
    "--root",
];

const NPM_VALUE_FLAGS: &[&str] = &["--registry", "--prefix", "--tag", "-w", "--workspace"];

const NUGET_VALUE_FLAGS: &[&str] = &["-v", "--version", "-s", "--source", "-f", "--framework"];

fn package_names(args: &[String], ecosystem: Ecosystem) -> Vec<String> {
    let mut names = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with('-') {
            skip_next = ecosystem.value_flags().contains(&arg.as_str());
            continue;
        }
        if arg.contains("://") || arg.starts_with('.') || arg.starts_with('/') {
            continue;
        }
        names.push(strip_version(arg, ecosystem));
    }
    names
}

/// `requests>=2.0` → `requests`, `pkg[extra]==1` → `pkg`,
/// `lodash@4` → `lodash`, `@scope/pkg@1` → `@scope/pkg`.
pub fn strip_version(spec: &str, ecosystem: Ecosystem) -> String {
    let name = match ecosystem {
        Ecosystem::Npm => match spec.strip_prefix('@') {
            Some(scoped) => match scoped.find('@') {
                Some(idx) => &spec[..idx + 1],
                None => spec,
            },
            None => spec.split('@').next().unwrap_or(spec),
        },
        Ecosystem::Pip | Ecosystem::NuGet => spec
            .split(['=', '>', '<', '~', '!', '[', ';', ' '])
            .next()
            .unwrap_or(spec),
    };
    name.trim().to_string()
}
