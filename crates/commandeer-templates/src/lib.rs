//! Command templates: named, ordered command lists with `${variable}`
//! placeholders and default bindings. Rendering performs variable
//! substitution only — no execution logic lives here.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

mod error;

pub use error::TemplateError;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"))
}

/// A named configuration template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub commands: Vec<String>,
    /// Default variable bindings, overridable at render time.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Template {
    /// Render the template, overlaying `overrides` on the defaults.
    /// Fails if any placeholder survives substitution.
    pub fn render(
        &self,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, TemplateError> {
        let mut bindings = self.variables.clone();
        bindings.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut rendered = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let mut line = command.clone();
            for (name, value) in &bindings {
                line = line.replace(&format!("${{{name}}}"), value);
            }

            if let Some(captures) = placeholder_re().captures(&line) {
                return Err(TemplateError::UnresolvedVariable {
                    template: self.name.clone(),
                    variable: captures[1].to_string(),
                    command: command.clone(),
                });
            }
            rendered.push(line);
        }
        Ok(rendered)
    }

    /// All placeholder names referenced by the template's commands.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .flat_map(|c| {
                placeholder_re()
                    .captures_iter(c)
                    .map(|cap| cap[1].to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Structural issues: empty name, no commands, blank command lines,
    /// placeholders with no default binding.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push("template name is required".to_string());
        }
        if self.commands.is_empty() {
            issues.push("template must contain at least one command".to_string());
        }

        for (i, command) in self.commands.iter().enumerate() {
            if command.trim().is_empty() {
                issues.push(format!("line {}: empty command", i + 1));
                continue;
            }
            for cap in placeholder_re().captures_iter(command) {
                let var = &cap[1];
                if !self.variables.contains_key(var) {
                    issues.push(format!("line {}: variable '{var}' has no default", i + 1));
                }
            }
        }

        issues
    }
}

/// Template library: built-in starter templates plus user templates loaded
/// from a directory of `*.json` / `*.yaml` / `*.yml` files.
#[derive(Debug, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, Template>,
}

impl TemplateLibrary {
    /// Built-ins only.
    pub fn builtin() -> Self {
        let mut library = Self::default();
        for template in builtin_templates() {
            library.templates.insert(template.name.clone(), template);
        }
        library
    }

    /// Built-ins plus every template file in `dir`. User templates shadow
    /// built-ins of the same name. Unreadable files are skipped with a
    /// warning rather than failing the whole load.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        let mut library = Self::builtin();

        if !dir.exists() {
            return Ok(library);
        }

        for entry in fs::read_dir(dir).map_err(|e| TemplateError::Io {
            path: dir.to_path_buf(),
            source: e,
        })? {
            let entry = entry.map_err(|e| TemplateError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            match load_template_file(&path) {
                Ok(Some(template)) => {
                    library.templates.insert(template.name.clone(), template);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template");
                }
            }
        }

        Ok(library)
    }

    pub fn get(&self, name: &str) -> Result<&Template, TemplateError> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    /// Templates in name order, optionally restricted to one tag.
    pub fn list(&self, tag: Option<&str>) -> Vec<&Template> {
        self.templates
            .values()
            .filter(|t| tag.is_none_or(|tag| t.tags.iter().any(|x| x == tag)))
            .collect()
    }

    /// Case-insensitive substring search over names and descriptions.
    pub fn search(&self, query: &str) -> Vec<&Template> {
        let query = query.to_lowercase();
        self.templates
            .values()
            .filter(|t| {
                t.name.to_lowercase().contains(&query)
                    || t.description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn load_template_file(path: &PathBuf) -> Result<Option<Template>, TemplateError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let contents = fs::read_to_string(path).map_err(|e| TemplateError::Io {
        path: path.clone(),
        source: e,
    })?;

    let template = match ext.as_str() {
        "json" => serde_json::from_str(&contents).map_err(|e| TemplateError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?,
        "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| TemplateError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?,
        _ => return Ok(None),
    };

    Ok(Some(template))
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            name: "basic_interface_config".to_string(),
            description: Some("Basic access-port interface configuration".to_string()),
            commands: vec![
                "interface ${interface}".to_string(),
                "description ${description}".to_string(),
                "switchport mode ${mode}".to_string(),
                "switchport access vlan ${vlan}".to_string(),
                "no shutdown".to_string(),
            ],
            variables: BTreeMap::from([
                ("interface".to_string(), "GigabitEthernet0/1".to_string()),
                ("description".to_string(), "User Port".to_string()),
                ("mode".to_string(), "access".to_string()),
                ("vlan".to_string(), "10".to_string()),
            ]),
            tags: vec!["interface".to_string(), "switchport".to_string()],
        },
        Template {
            name: "vlan_creation".to_string(),
            description: Some("Create a VLAN with a name".to_string()),
            commands: vec!["vlan ${vlan_id}".to_string(), "name ${vlan_name}".to_string()],
            variables: BTreeMap::from([
                ("vlan_id".to_string(), "10".to_string()),
                ("vlan_name".to_string(), "DATA_VLAN".to_string()),
            ]),
            tags: vec!["vlan".to_string()],
        },
        Template {
            name: "save_config".to_string(),
            description: Some("Save the running configuration".to_string()),
            commands: vec!["copy running-config startup-config".to_string()],
            variables: BTreeMap::new(),
            tags: vec!["maintenance".to_string()],
        },
        Template {
            name: "show_interface_status".to_string(),
            description: Some("Interface status summary".to_string()),
            commands: vec!["show interfaces status".to_string()],
            variables: BTreeMap::new(),
            tags: vec!["show".to_string(), "troubleshooting".to_string()],
        },
        Template {
            name: "show_vlan_brief".to_string(),
            description: Some("VLAN summary".to_string()),
            commands: vec!["show vlan brief".to_string()],
            variables: BTreeMap::new(),
            tags: vec!["show".to_string(), "troubleshooting".to_string()],
        },
    ]
}
