//! # Core Topology Discovery
//!
//! Discovers physical cores using:
//! 1. hwlocality crate (if `hwloc` feature enabled)
//! 2. sysfs parsing on Linux (fallback)
//! 3. One core per allowed hardware thread on other platforms
//!
//! Only hardware threads in the process affinity mask are kept, so every
//! discovered core can actually be pinned to.

use std::collections::BTreeMap;

use super::{affinity, NumaError};

/// Identifier of a physical core, valid in `[0, num_cores)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub usize);

impl CoreId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// A physical core and the hardware threads it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    /// Dense index assigned at discovery
    pub id: CoreId,
    /// Socket (physical package) of the core
    pub package: usize,
    /// NUMA node of the core
    pub numa_node: usize,
    /// Hardware threads (logical CPUs) of the core
    pub cpus: Vec<usize>,
}

/// Physical core topology of the system.
///
/// Cores are ordered socket-major, so on a two-socket machine the first half
/// of the ids belongs to socket 0 and the second half to socket 1.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Cores, indexed by `CoreId`
    cores: Vec<Core>,
    /// Number of NUMA nodes
    num_nodes: usize,
}

impl Topology {
    /// Discover the physical cores available to this process.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::NoCores`] if no core survives the affinity filter,
    /// or an error if the affinity mask cannot be read.
    pub fn discover() -> Result<Self, NumaError> {
        let allowed = affinity::allowed_cpus()?;

        #[cfg(feature = "hwloc")]
        {
            match Self::discover_hwlocality(&allowed) {
                Ok(topo) => return Ok(topo),
                Err(e) => tracing::debug!("hwloc discovery failed, trying sysfs: {e}"),
            }
        }

        #[cfg(target_os = "linux")]
        {
            match Self::discover_sysfs(&allowed) {
                Ok(topo) => return Ok(topo),
                Err(e) => tracing::debug!("sysfs discovery failed, using flat topology: {e}"),
            }
        }

        Self::flat(&allowed)
    }

    /// Builds a topology from explicit cores, reassigning dense ids in order.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::NoCores`] if `cores` is empty or a core has no
    /// hardware thread.
    pub fn from_cores(mut cores: Vec<Core>) -> Result<Self, NumaError> {
        if cores.is_empty() || cores.iter().any(|c| c.cpus.is_empty()) {
            return Err(NumaError::NoCores);
        }
        for (idx, core) in cores.iter_mut().enumerate() {
            core.id = CoreId(idx);
        }
        let num_nodes = cores.iter().map(|c| c.numa_node).max().map_or(1, |n| n + 1);
        Ok(Self { cores, num_nodes })
    }

    /// Builds a topology of `count` cores that all map onto the same
    /// hardware threads.
    ///
    /// Useful on machines (or CI containers) with fewer physical cores than a
    /// round needs: pinning still goes through the OS, but never fails.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::NoCores`] if `count` is 0 or `cpus` is empty.
    pub fn uniform(count: usize, cpus: &[usize]) -> Result<Self, NumaError> {
        let half = count.div_ceil(2);
        let cores = (0..count)
            .map(|idx| Core {
                id: CoreId(idx),
                package: usize::from(idx >= half),
                numa_node: 0,
                cpus: cpus.to_vec(),
            })
            .collect();
        Self::from_cores(cores)
    }

    /// Discover cores using hwlocality crate.
    #[cfg(feature = "hwloc")]
    fn discover_hwlocality(allowed: &[usize]) -> Result<Self, NumaError> {
        use hwlocality::object::types::ObjectType;
        use hwlocality::Topology as HwlocTopology;

        let hwloc_topo = HwlocTopology::new()
            .map_err(|e| NumaError::TopologyError(format!("hwlocality init failed: {e}")))?;

        let nodes: Vec<Vec<usize>> = hwloc_topo
            .objects_with_type(ObjectType::NUMANode)
            .map(|node| {
                node.cpuset()
                    .map(|set| set.iter_set().map(usize::from).collect())
                    .unwrap_or_default()
            })
            .collect();

        let mut cores = Vec::new();
        for core in hwloc_topo.objects_with_type(ObjectType::Core) {
            let Some(cpuset) = core.cpuset() else {
                continue;
            };
            let cpus: Vec<usize> = cpuset
                .iter_set()
                .map(usize::from)
                .filter(|cpu| allowed.contains(cpu))
                .collect();
            let Some(&first) = cpus.first() else {
                continue;
            };
            let package = hwloc_topo
                .objects_with_type(ObjectType::Package)
                .position(|pkg| pkg.cpuset().is_some_and(|s| s.is_set(first)))
                .unwrap_or(0);
            let numa_node = nodes.iter().position(|n| n.contains(&first)).unwrap_or(0);
            cores.push(Core {
                id: CoreId(0),
                package,
                numa_node,
                cpus,
            });
        }

        if cores.is_empty() {
            return Err(NumaError::TopologyError(
                "No cores found via hwlocality".to_string(),
            ));
        }
        cores.sort_by_key(|c| (c.package, c.cpus[0]));
        Self::from_cores(cores)
    }

    /// Discover cores from sysfs on Linux.
    #[cfg(target_os = "linux")]
    fn discover_sysfs(allowed: &[usize]) -> Result<Self, NumaError> {
        use std::fs;
        use std::path::Path;

        let cpu_root = Path::new("/sys/devices/system/cpu");
        let online = fs::read_to_string(cpu_root.join("online"))
            .map_err(|e| NumaError::TopologyError(format!("Failed to read online cpus: {e}")))?;

        let cpu_to_node = Self::read_cpu_to_node();

        // (package, core_id) -> hardware threads
        let mut grouped: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for cpu in Self::parse_cpulist(online.trim()) {
            if !allowed.contains(&cpu) {
                continue;
            }
            let topo_dir = cpu_root.join(format!("cpu{cpu}/topology"));
            let read_id = |name: &str| -> Result<usize, NumaError> {
                let raw = fs::read_to_string(topo_dir.join(name)).map_err(|e| {
                    NumaError::TopologyError(format!("Failed to read cpu{cpu}/{name}: {e}"))
                })?;
                raw.trim().parse::<usize>().map_err(|e| {
                    NumaError::TopologyError(format!("Bad cpu{cpu}/{name} value: {e}"))
                })
            };
            let package = read_id("physical_package_id")?;
            let core_id = read_id("core_id")?;
            grouped.entry((package, core_id)).or_default().push(cpu);
        }

        if grouped.is_empty() {
            return Err(NumaError::TopologyError(
                "No online cpu in affinity mask".to_string(),
            ));
        }

        let mut cores: Vec<Core> = grouped
            .into_iter()
            .map(|((package, _), mut cpus)| {
                cpus.sort_unstable();
                let numa_node = cpu_to_node.get(&cpus[0]).copied().unwrap_or(0);
                Core {
                    id: CoreId(0),
                    package,
                    numa_node,
                    cpus,
                }
            })
            .collect();
        cores.sort_by_key(|c| (c.package, c.cpus[0]));
        Self::from_cores(cores)
    }

    /// Reads the cpu -> NUMA node mapping from sysfs. Missing data maps to node 0.
    #[cfg(target_os = "linux")]
    fn read_cpu_to_node() -> BTreeMap<usize, usize> {
        use std::fs;

        let mut mapping = BTreeMap::new();
        let Ok(entries) = fs::read_dir("/sys/devices/system/node") else {
            return mapping;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(node) = name.strip_prefix("node").and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            if let Ok(cpulist) = fs::read_to_string(entry.path().join("cpulist")) {
                for cpu in Self::parse_cpulist(cpulist.trim()) {
                    mapping.insert(cpu, node);
                }
            }
        }
        mapping
    }

    /// Parse a CPU list string like "0-7,16-23".
    fn parse_cpulist(s: &str) -> Vec<usize> {
        let mut cpus = Vec::new();

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<usize>() {
                cpus.push(cpu);
            }
        }

        cpus
    }

    /// One core per allowed hardware thread, single socket.
    fn flat(allowed: &[usize]) -> Result<Self, NumaError> {
        let cores = allowed
            .iter()
            .map(|&cpu| Core {
                id: CoreId(0),
                package: 0,
                numa_node: 0,
                cpus: vec![cpu],
            })
            .collect();
        Self::from_cores(cores)
    }

    /// Returns the number of physical cores.
    #[must_use]
    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    /// Returns the number of NUMA nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Returns all cores in id order.
    #[must_use]
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Returns the core with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::InvalidCore`] if `id` is out of range.
    pub fn core(&self, id: CoreId) -> Result<&Core, NumaError> {
        self.cores.get(id.0).ok_or(NumaError::InvalidCore {
            core: id,
            available: self.cores.len(),
        })
    }

    /// Binds the calling thread (or single-threaded process) to a core.
    ///
    /// Call once per participant at startup. A failure is not recoverable:
    /// a participant running off its core would measure the wrong path.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::InvalidCore`] or [`NumaError::PinFailed`].
    pub fn pin_current_unit(&self, id: CoreId) -> Result<(), NumaError> {
        let core = self.core(id)?;
        affinity::pin_to_cpus(&core.cpus).map_err(|source| NumaError::PinFailed {
            core: id,
            cpus: core.cpus.clone(),
            source,
        })
    }

    /// Log the discovered topology.
    pub fn log_topology(&self) {
        tracing::info!(
            "Topology: {} cores, {} NUMA nodes",
            self.cores.len(),
            self.num_nodes
        );
        for core in &self.cores {
            tracing::debug!(
                "  Core {}: package {}, node {}, cpus {:?}",
                core.id,
                core.package,
                core.numa_node,
                core.cpus
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(package: usize, cpus: Vec<usize>) -> Core {
        Core {
            id: CoreId(99),
            package,
            numa_node: package,
            cpus,
        }
    }

    #[test]
    fn test_discover() {
        let topo = Topology::discover().unwrap();
        assert!(topo.num_cores() >= 1);
        assert!(topo.num_nodes() >= 1);
        for (idx, core) in topo.cores().iter().enumerate() {
            assert_eq!(core.id, CoreId(idx));
            assert!(!core.cpus.is_empty());
        }
    }

    #[test]
    fn test_from_cores_reassigns_ids() {
        let topo = Topology::from_cores(vec![core(0, vec![0, 4]), core(1, vec![2, 6])]).unwrap();
        assert_eq!(topo.num_cores(), 2);
        assert_eq!(topo.core(CoreId(1)).unwrap().id, CoreId(1));
        assert_eq!(topo.num_nodes(), 2);
        assert_eq!(topo.core(CoreId(1)).unwrap().numa_node, 1);
    }

    #[test]
    fn test_empty_topology_rejected() {
        assert!(matches!(Topology::from_cores(vec![]), Err(NumaError::NoCores)));
        assert!(matches!(
            Topology::from_cores(vec![core(0, vec![])]),
            Err(NumaError::NoCores)
        ));
        assert!(matches!(Topology::uniform(0, &[0]), Err(NumaError::NoCores)));
    }

    #[test]
    fn test_invalid_core() {
        let topo = Topology::uniform(2, &[0]).unwrap();
        let err = topo.core(CoreId(2)).unwrap_err();
        assert!(matches!(
            err,
            NumaError::InvalidCore {
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_uniform_splits_packages() {
        let topo = Topology::uniform(4, &[0]).unwrap();
        let packages: Vec<usize> = topo.cores().iter().map(|c| c.package).collect();
        assert_eq!(packages, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_parse_cpulist() {
        assert_eq!(Topology::parse_cpulist("0"), vec![0]);
        assert_eq!(Topology::parse_cpulist("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(Topology::parse_cpulist("0,2,4"), vec![0, 2, 4]);
        assert_eq!(
            Topology::parse_cpulist("0-3,8-11"),
            vec![0, 1, 2, 3, 8, 9, 10, 11]
        );
    }

    #[test]
    fn test_pin_invalid_core() {
        let topo = Topology::uniform(1, &[0]).unwrap();
        assert!(matches!(
            topo.pin_current_unit(CoreId(5)),
            Err(NumaError::InvalidCore { .. })
        ));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_pin_offline_cpu_fails() {
        let topo = Topology::uniform(1, &[1023]).unwrap();
        let handle = std::thread::spawn(move || topo.pin_current_unit(CoreId(0)));
        let result = handle.join().unwrap();
        if affinity::allowed_cpus().unwrap().contains(&1023) {
            return;
        }
        assert!(matches!(result, Err(NumaError::PinFailed { .. })));
    }
}
