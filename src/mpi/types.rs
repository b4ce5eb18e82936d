// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Value types shared by the flavor descriptors.

use std::cmp::Ordering;
use std::path::Path;

use crate::layout::ProcessLayout;

/// Interconnect used by the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Infiniband,
    Det,
    Shm,
    Socket,
}

impl Device {
    /// Probe order when nothing is forced
    const ORDER: [Device; 4] = [Device::Infiniband, Device::Det, Device::Shm, Device::Socket];

    pub fn name(&self) -> &'static str {
        match self {
            Device::Infiniband => "ib",
            Device::Det => "det",
            Device::Shm => "shm",
            Device::Socket => "socket",
        }
    }

    /// Device node whose presence indicates availability, `None` if always available
    fn location(&self) -> Option<&'static str> {
        match self {
            Device::Infiniband => Some("/dev/infiniband"),
            Device::Det => Some("/dev/det"),
            Device::Shm => Some("/dev/shm"),
            Device::Socket => None,
        }
    }

    /// Pick the device: forced choices first, then the first one present.
    /// Shared memory only qualifies for single node jobs.
    pub fn select(rdma: bool, socket: bool, single_node: bool, exists: impl Fn(&Path) -> bool) -> Device {
        if rdma {
            return Device::Infiniband;
        }
        if socket {
            return Device::Socket;
        }
        Self::ORDER
            .into_iter()
            .filter(|d| single_node || *d != Device::Shm)
            .find(|d| d.location().map_or(true, |p| exists(Path::new(p))))
            .unwrap_or(Device::Socket)
    }
}

/// Host file syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostfileFormat {
    /// `node slots=N`
    SlotsKeyword,
    /// `node:N`
    ColonCount,
}

impl HostfileFormat {
    /// Render the host file; nodes without ranks are left out
    pub fn render(&self, layout: &ProcessLayout) -> String {
        layout
            .active_nodes()
            .map(|n| match self {
                HostfileFormat::SlotsKeyword => format!("{} slots={}\n", n.node, n.processes),
                HostfileFormat::ColonCount => format!("{}:{}\n", n.node, n.processes),
            })
            .collect()
    }
}

/// How forwarded variable names are passed to mpirun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStyle {
    /// One `<flag> NAME` pair per variable
    PerVariable(&'static str),
    /// One `<flag> A,B,C` pair for all variables
    CommaList(&'static str),
}

impl PassStyle {
    pub fn args(&self, names: &[String]) -> Vec<String> {
        if names.is_empty() {
            return Vec::new();
        }
        match self {
            PassStyle::PerVariable(flag) => names
                .iter()
                .flat_map(|n| [flag.to_string(), n.clone()])
                .collect(),
            PassStyle::CommaList(flag) => vec![flag.to_string(), names.join(",")],
        }
    }
}

/// Launch mechanism for remote ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// Scheduler-integrated mechanism, e.g. `slurm`
    Native(&'static str),
    /// Remote shell, with the program used to reach the nodes
    Generic { name: String, exec: String },
}

/// Leading numeric components of a version string: `4.1.3.049` -> [4, 1, 3, 49],
/// `1.6rc1` -> [1, 6]
fn components(version: &str) -> Vec<u64> {
    let mut parts = Vec::new();
    for part in version.split(['.', '-']) {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        let Ok(value) = digits.parse() else {
            break;
        };
        parts.push(value);
        if digits.len() < part.len() {
            break;
        }
    }
    parts
}

/// Compare two dotted versions, missing components count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// `min <= version < max`, open ends when `None`
pub fn version_in_range(version: &str, min: Option<&str>, max: Option<&str>) -> bool {
    min.map_or(true, |m| compare_versions(version, m).is_ge())
        && max.map_or(true, |m| compare_versions(version, m).is_lt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::plan;
    use crate::options::OptionSet;
    use crate::sched::{NodeResources, ResourceSnapshot};

    #[test]
    fn test_device_select() {
        let nothing = |_: &Path| false;
        let everything = |_: &Path| true;
        let only_shm = |p: &Path| p == Path::new("/dev/shm");

        assert_eq!(Device::select(true, false, false, nothing), Device::Infiniband);
        assert_eq!(Device::select(false, true, false, everything), Device::Socket);
        assert_eq!(Device::select(false, false, false, everything), Device::Infiniband);
        assert_eq!(Device::select(false, false, true, only_shm), Device::Shm);
        assert_eq!(Device::select(false, false, false, only_shm), Device::Socket);
        assert_eq!(Device::select(false, false, false, nothing), Device::Socket);
    }

    #[test]
    fn test_hostfile_render() {
        let snapshot = ResourceSnapshot::new(
            "1",
            vec![NodeResources::new("node1", 4), NodeResources::new("node2", 4)],
        );
        let opts = OptionSet {
            universe: Some(1),
            ..Default::default()
        };
        let layout = plan(&snapshot, &opts).unwrap();

        assert_eq!(HostfileFormat::SlotsKeyword.render(&layout), "node1 slots=1\n");

        let layout = plan(&snapshot, &OptionSet::default()).unwrap();
        assert_eq!(HostfileFormat::ColonCount.render(&layout), "node1:4\nnode2:4\n");
    }

    #[test]
    fn test_pass_style() {
        let names = vec!["A".to_string(), "B".to_string()];
        assert_eq!(PassStyle::PerVariable("-x").args(&names), vec!["-x", "A", "-x", "B"]);
        assert_eq!(PassStyle::CommaList("-envlist").args(&names), vec!["-envlist", "A,B"]);
        assert!(PassStyle::CommaList("-envlist").args(&[]).is_empty());
    }

    #[test]
    fn test_version_in_range() {
        assert!(version_in_range("4.1.0.024", Some("4.1"), None));
        assert!(!version_in_range("4.0.3", Some("4.1"), None));
        assert!(version_in_range("2.0.4", Some("2.0"), Some("2.1")));
        assert!(!version_in_range("2.1.0", Some("2.0"), Some("2.1")));
        assert!(version_in_range("1.8.4-GCC-4.9.2", Some("1.6"), None));
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    }
}
