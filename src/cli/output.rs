//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::api::UserSelf;
use crate::datasource::{Namespace, OrgMember, Package};
use crate::reconcile::{LifecycleState, ManagedResource};
use crate::resources::Entitlement;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Snapshot of a lifecycle after an operation.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    /// Resource kind.
    pub kind: &'static str,
    /// Tracked identity, if any.
    pub identity: Option<String>,
    /// Lifecycle state.
    pub state: String,
    /// Observed state, if any.
    pub observed: Option<Value>,
}

impl ResourceReport {
    /// Captures the current view of a managed resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the observed state cannot be encoded.
    pub fn capture(resource: &dyn ManagedResource) -> crate::error::Result<Self> {
        Ok(Self {
            kind: resource.kind(),
            identity: resource.identity().map(str::to_string),
            state: resource.state().to_string(),
            observed: resource.observed()?,
        })
    }
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Downloads")]
    downloads: u64,
    #[tabled(rename = "ID")]
    id: String,
}

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Email")]
    email: String,
}

#[derive(Tabled)]
struct TokenRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "Downloads limit")]
    downloads: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of an API key check.
    #[must_use]
    pub fn format_check(&self, user: &UserSelf) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(user).unwrap_or_default(),
            OutputFormat::Text => {
                if user.authenticated {
                    let who = user
                        .slug
                        .as_deref()
                        .or(user.name.as_deref())
                        .unwrap_or("unknown");
                    format!("{} Authenticated as {who}\n", "✓".green())
                } else {
                    format!("{} API key did not authenticate\n", "✗".red())
                }
            }
        }
    }

    /// Formats a resource snapshot.
    #[must_use]
    pub fn format_resource(&self, report: &ResourceReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(
                    output,
                    "\n{} {}",
                    report.kind.bold(),
                    report.identity.as_deref().unwrap_or("-")
                );
                let _ = writeln!(output, "   State: {}", Self::format_state(&report.state));

                match &report.observed {
                    Some(observed) => {
                        output.push('\n');
                        let body = serde_yaml::to_string(observed).unwrap_or_default();
                        for line in body.lines() {
                            let _ = writeln!(output, "   {line}");
                        }
                    }
                    None => output.push_str("   Not found.\n"),
                }

                output
            }
        }
    }

    /// Formats a completed delete.
    #[must_use]
    pub fn format_deleted(&self, kind: &str, key: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "kind": kind, "key": key, "deleted": true });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} Deleted {kind} {key}\n", "✓".green()),
        }
    }

    /// Formats a package listing.
    #[must_use]
    pub fn format_packages(&self, packages: &[Package]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(packages).unwrap_or_default(),
            OutputFormat::Text => {
                let rows = packages.iter().map(|p| PackageRow {
                    name: Self::truncate(&p.name, 40),
                    version: p.version.clone().unwrap_or_default(),
                    format: p.format.clone(),
                    status: p.status_str.clone().unwrap_or_default(),
                    downloads: p.downloads,
                    id: p.slug_perm.clone(),
                });
                Self::table("packages", packages.len(), rows)
            }
        }
    }

    /// Formats an organization member listing.
    #[must_use]
    pub fn format_members(&self, members: &[OrgMember]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(members).unwrap_or_default(),
            OutputFormat::Text => {
                let rows = members.iter().map(|m| MemberRow {
                    user: m.user.clone(),
                    role: m.role.clone(),
                    active: Self::format_flag(m.is_active),
                    email: m.email.clone().unwrap_or_default(),
                });
                Self::table("members", members.len(), rows)
            }
        }
    }

    /// Formats an entitlement token listing.
    #[must_use]
    pub fn format_entitlements(&self, tokens: &[Entitlement]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(tokens).unwrap_or_default(),
            OutputFormat::Text => {
                let rows = tokens.iter().map(|t| TokenRow {
                    name: t.name.clone(),
                    active: Self::format_flag(t.is_active),
                    token: t.token.clone().unwrap_or_else(|| String::from("********")),
                    downloads: t
                        .limit_num_downloads
                        .map_or_else(|| String::from("-"), |n| n.to_string()),
                    id: t.slug_perm.clone(),
                });
                Self::table("entitlement tokens", tokens.len(), rows)
            }
        }
    }

    /// Formats a namespace.
    #[must_use]
    pub fn format_namespace(&self, namespace: &Namespace) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(namespace).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\n{} {}", namespace.slug.bold(), namespace.name);
                let _ = writeln!(output, "   Type: {}", namespace.kind);
                let _ = writeln!(output, "   ID: {}", namespace.slug_perm);
                output
            }
        }
    }

    fn table<R: Tabled>(noun: &str, count: usize, rows: impl Iterator<Item = R>) -> String {
        if count == 0 {
            return format!("No {noun} found.\n");
        }

        let mut output = Table::new(rows).to_string();
        let _ = write!(output, "\n\n{count} {noun}\n");
        output
    }

    fn format_state(state: &str) -> String {
        match state {
            s if s == LifecycleState::Present.to_string() => s.green().to_string(),
            s if s == LifecycleState::Absent.to_string() => s.dimmed().to_string(),
            s => s.yellow().to_string(),
        }
    }

    fn format_flag(flag: bool) -> String {
        if flag {
            "yes".green().to_string()
        } else {
            "no".red().to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
