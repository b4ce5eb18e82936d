// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Slurm integration: allocation from the job environment and scontrol.

use std::process::Command;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use super::{NodeResources, ResourceSnapshot, Scheduler};
use crate::env::Environment;
use crate::error::ResourceError;

pub struct Slurm;

impl Scheduler for Slurm {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn job_id_vars(&self) -> &'static [&'static str] {
        &["SLURM_JOB_ID", "SLURM_JOBID"]
    }

    fn node_info_var(&self) -> Option<&'static str> {
        Some("SLURM_NODELIST")
    }

    fn native_launcher(&self) -> &'static str {
        "slurm"
    }

    fn snapshot(&self, env: &Environment) -> Result<ResourceSnapshot, ResourceError> {
        let nodelist = lookup(env, &["SLURM_JOB_NODELIST", "SLURM_NODELIST"])
            .ok_or(ResourceError::MissingVariable("SLURM_NODELIST"))?;
        let tasks = lookup(env, &["SLURM_TASKS_PER_NODE", "SLURM_JOB_CPUS_PER_NODE"])
            .ok_or(ResourceError::MissingVariable("SLURM_TASKS_PER_NODE"))?;

        let hosts = expand_nodelist(nodelist).map_err(|e| ResourceError::Probe(format!("{e:#}")))?;
        snapshot_from(self.job_id(env), hosts, tasks)
    }
}

fn lookup<'a>(env: &'a Environment, vars: &[&str]) -> Option<&'a str> {
    vars.iter()
        .find_map(|var| env.get(*var))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Combine expanded hostnames with the per-node task counts
fn snapshot_from(
    job_id: String,
    hosts: Vec<String>,
    tasks_per_node: &str,
) -> Result<ResourceSnapshot, ResourceError> {
    let counts = parse_tasks_per_node(tasks_per_node)?;
    if counts.len() != hosts.len() {
        return Err(ResourceError::Inconsistent(format!(
            "{} hosts in nodelist but {} entries in tasks per node '{}'",
            hosts.len(),
            counts.len(),
            tasks_per_node
        )));
    }

    let nodes = hosts
        .into_iter()
        .zip(counts)
        .map(|(host, cores)| NodeResources::new(host, cores))
        .collect();
    Ok(ResourceSnapshot::new(job_id, nodes))
}

/// Parse the compressed per-node count format, e.g. `2(x3),1`
fn parse_tasks_per_node(spec: &str) -> Result<Vec<usize>, ResourceError> {
    static ENTRY: OnceLock<Option<Regex>> = OnceLock::new();
    let entry = ENTRY
        .get_or_init(|| Regex::new(r"^(\d+)(?:\(x(\d+)\))?$").ok())
        .as_ref()
        .ok_or_else(|| ResourceError::Probe("invalid tasks per node pattern".to_string()))?;

    let invalid = || ResourceError::Inconsistent(format!("cannot parse tasks per node '{spec}'"));

    let mut counts = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let caps = entry.captures(part).ok_or_else(invalid)?;
        let count: usize = caps[1].parse().map_err(|_| invalid())?;
        let repeat: usize = match caps.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 1,
        };
        counts.extend(std::iter::repeat(count).take(repeat));
    }
    Ok(counts)
}

/// Expand a Slurm nodelist to individual hostnames
///
/// Uses `scontrol show hostnames` which handles all Slurm nodelist formats.
pub fn expand_nodelist(nodelist: &str) -> Result<Vec<String>> {
    if nodelist.is_empty() || nodelist == "(null)" {
        return Ok(Vec::new());
    }

    let output = Command::new("scontrol")
        .args(["show", "hostnames", nodelist])
        .output()
        .context("Failed to execute scontrol show hostnames")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Failed to expand nodelist '{}': {}", nodelist, stderr.trim()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_tasks_per_node() {
        assert_eq!(parse_tasks_per_node("4").unwrap(), vec![4]);
        assert_eq!(parse_tasks_per_node("2(x3)").unwrap(), vec![2, 2, 2]);
        assert_eq!(parse_tasks_per_node("2(x2),1,8(x1)").unwrap(), vec![2, 2, 1, 8]);
        assert!(parse_tasks_per_node("2x3").is_err());
        assert!(parse_tasks_per_node("four").is_err());
    }

    #[test]
    fn test_snapshot_from() {
        let snapshot =
            snapshot_from("77".into(), hosts(&["node001", "node002", "node003"]), "16(x2),8").unwrap();

        assert_eq!(snapshot.job_id, "77");
        assert_eq!(
            snapshot.nodes(),
            &[
                NodeResources::new("node001", 16),
                NodeResources::new("node002", 16),
                NodeResources::new("node003", 8),
            ]
        );
        assert_eq!(snapshot.total_cores(), 40);
    }

    #[test]
    fn test_snapshot_length_mismatch() {
        let err = snapshot_from("1".into(), hosts(&["node001", "node002"]), "4").unwrap_err();
        assert!(matches!(err, ResourceError::Inconsistent(_)));
    }

    #[test]
    fn test_expand_empty_nodelist() {
        assert!(expand_nodelist("").unwrap().is_empty());
        assert!(expand_nodelist("(null)").unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_missing_variables() {
        let mut env = Environment::new();
        env.insert("SLURM_JOB_ID".into(), "5".into());
        assert!(matches!(
            Slurm.snapshot(&env),
            Err(ResourceError::MissingVariable("SLURM_NODELIST"))
        ));
    }
}
