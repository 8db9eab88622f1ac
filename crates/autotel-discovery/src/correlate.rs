use std::collections::{BTreeMap, HashMap};

use autotel_domain::{DiscoverySignal, Endpoint, ServiceInfo, ServiceKind};

use crate::scanner::Candidate;

/// Collapse raw scanner candidates into one ServiceInfo per
/// `(kind, primary endpoint)`.
///
/// Signals with the same kind and a compatible endpoint merge: their
/// `discovered_by` sets union, endpoints deduplicate, and confidence is
/// recomputed. Two candidates of the same kind pinned to disjoint endpoints
/// (or distinct pids) are distinct instances and stay separate. When a
/// well-known port and a scanned process disagree on the kind for the same
/// pid, the process signal wins (it has the pid).
pub fn correlate(mut candidates: Vec<Candidate>) -> Vec<ServiceInfo> {
    // Pid → kind as seen by the process scanner, used for the port tie-break.
    let process_kinds: HashMap<u32, ServiceKind> = candidates
        .iter()
        .filter(|c| c.signal == DiscoverySignal::Process)
        .filter_map(|c| c.process_info.as_ref().map(|p| (p.pid, c.kind)))
        .collect();

    for candidate in &mut candidates {
        if candidate.signal != DiscoverySignal::Port {
            continue;
        }
        if let Some(pid) = candidate.process_info.as_ref().map(|p| p.pid) {
            if let Some(kind) = process_kinds.get(&pid) {
                if *kind != candidate.kind {
                    candidate.kind = *kind;
                }
            }
        }
    }

    let mut by_kind: BTreeMap<ServiceKind, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_kind.entry(candidate.kind).or_default().push(candidate);
    }

    let mut services = Vec::new();
    for (kind, group) in by_kind {
        services.extend(merge_instances(kind, group));
    }
    services
}

/// One instance of a service kind being assembled: the endpoints and pid
/// pin its identity, the members carry the signals.
struct Instance {
    endpoints: Vec<Endpoint>,
    pid: Option<u32>,
    members: Vec<Candidate>,
}

impl Instance {
    fn seed(candidate: Candidate) -> Instance {
        let mut instance = Instance {
            endpoints: Vec::new(),
            pid: None,
            members: Vec::new(),
        };
        instance.absorb(candidate);
        instance
    }

    /// Endpoint-compatibility per the correlation rule: matching pids always
    /// merge (one process, several listen sockets), endpoint-bearing signals
    /// merge only when they share an endpoint, and signals with no instance
    /// identity of their own (config path, package entry) attach to the
    /// first instance of the kind.
    fn compatible(&self, candidate: &Candidate) -> bool {
        if let (Some(mine), Some(theirs)) =
            (self.pid, candidate.process_info.as_ref().map(|p| p.pid))
        {
            return mine == theirs;
        }
        if !self.endpoints.is_empty() && !candidate.endpoints.is_empty() {
            return candidate.endpoints.iter().any(|e| self.endpoints.contains(e));
        }
        true
    }

    fn absorb(&mut self, candidate: Candidate) {
        for endpoint in &candidate.endpoints {
            if !self.endpoints.contains(endpoint) {
                self.endpoints.push(endpoint.clone());
            }
        }
        if self.pid.is_none() {
            self.pid = candidate.process_info.as_ref().map(|p| p.pid);
        }
        self.members.push(candidate);
    }

    fn into_service_info(self, kind: ServiceKind) -> ServiceInfo {
        let mut iter = self.members.into_iter();
        let first = iter.next().expect("instance is never empty");
        let mut svc = ServiceInfo::new(kind, first.signal);
        apply(&mut svc, first);
        for candidate in iter {
            svc.add_signal(candidate.signal);
            apply(&mut svc, candidate);
        }

        // Deterministic endpoint order so the primary endpoint, and with it
        // the rendered config hash, is stable across scans.
        svc.endpoints.sort();
        svc.endpoints.dedup();
        svc.config_paths.sort();
        svc.config_paths.dedup();
        svc
    }
}

fn merge_instances(kind: ServiceKind, group: Vec<Candidate>) -> Vec<ServiceInfo> {
    // Candidates that pin an instance (an endpoint or a pid) are grouped
    // first, in a stable order, so signal-only candidates attach to the
    // primary instance instead of founding their own.
    let (mut pinned, floating): (Vec<Candidate>, Vec<Candidate>) = group
        .into_iter()
        .partition(|c| !c.endpoints.is_empty() || c.process_info.is_some());
    pinned.sort_by(|a, b| {
        let key = |c: &Candidate| {
            (c.endpoints.first().cloned(), c.process_info.as_ref().map(|p| p.pid))
        };
        key(a).cmp(&key(b))
    });

    let mut instances: Vec<Instance> = Vec::new();
    for candidate in pinned.into_iter().chain(floating) {
        match instances.iter_mut().find(|i| i.compatible(&candidate)) {
            Some(instance) => instance.absorb(candidate),
            None => instances.push(Instance::seed(candidate)),
        }
    }

    let mut services: Vec<ServiceInfo> =
        instances.into_iter().map(|i| i.into_service_info(kind)).collect();
    services.sort_by(|a, b| a.endpoints.first().cmp(&b.endpoints.first()));
    services
}

fn apply(svc: &mut ServiceInfo, candidate: Candidate) {
    for endpoint in candidate.endpoints {
        svc.add_endpoint(endpoint);
    }
    if svc.version.is_none() {
        svc.version = candidate.version;
    }
    match (&svc.process_info, &candidate.process_info) {
        // The process-scan signal carries a cmdline; a bare pid from the
        // socket-inode mapping does not. Keep the richer one.
        (Some(existing), Some(incoming))
            if existing.cmdline.is_empty() && !incoming.cmdline.is_empty() =>
        {
            svc.process_info = candidate.process_info;
        }
        (None, Some(_)) => svc.process_info = candidate.process_info,
        _ => {}
    }
    svc.config_paths.extend(candidate.config_paths);
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotel_domain::{Confidence, ProcessInfo};

    fn process_candidate(kind: ServiceKind, pid: u32) -> Candidate {
        let mut c = Candidate::new(kind, DiscoverySignal::Process);
        c.process_info = Some(ProcessInfo { pid, cmdline: format!("{kind} --daemon"), user: None });
        c
    }

    fn port_candidate(kind: ServiceKind, port: u16, pid: Option<u32>) -> Candidate {
        let mut c = Candidate::new(kind, DiscoverySignal::Port);
        c.endpoints.push(Endpoint::tcp("localhost", port));
        c.process_info = pid.map(|p| ProcessInfo { pid: p, cmdline: String::new(), user: None });
        c
    }

    #[test]
    fn four_signals_collapse_to_one_high_confidence_service() {
        let mut config = Candidate::new(ServiceKind::Mysql, DiscoverySignal::ConfigFile);
        config.config_paths.push("/etc/mysql".into());
        let mut package = Candidate::new(ServiceKind::Mysql, DiscoverySignal::Package);
        package.version = Some("8.0.36".into());

        let services = correlate(vec![
            process_candidate(ServiceKind::Mysql, 100),
            port_candidate(ServiceKind::Mysql, 3306, Some(100)),
            config,
            package,
        ]);

        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.kind, ServiceKind::Mysql);
        assert_eq!(svc.discovered_by.len(), 4);
        assert_eq!(svc.confidence, Confidence::High);
        assert_eq!(svc.primary_endpoint().unwrap().port, 3306);
        assert_eq!(svc.version.as_deref(), Some("8.0.36"));
        let pi = svc.process_info.as_ref().unwrap();
        assert_eq!(pi.pid, 100);
        assert!(!pi.cmdline.is_empty(), "process-scan cmdline preferred over bare pid");
    }

    #[test]
    fn two_signals_give_medium_confidence() {
        let services = correlate(vec![
            process_candidate(ServiceKind::Redis, 42),
            port_candidate(ServiceKind::Redis, 6379, None),
        ]);
        assert_eq!(services[0].confidence, Confidence::Medium);
    }

    #[test]
    fn two_instances_on_distinct_endpoints_stay_separate() {
        // Two MySQL servers on 3306 and 3307 with no socket-owner info:
        // nothing ties the endpoints together, so they are two services.
        let services = correlate(vec![
            port_candidate(ServiceKind::Mysql, 3306, None),
            port_candidate(ServiceKind::Mysql, 3307, None),
        ]);

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].primary_endpoint().unwrap().port, 3306);
        assert_eq!(services[1].primary_endpoint().unwrap().port, 3307);
        for svc in &services {
            assert_eq!(svc.endpoints.len(), 1);
            assert_eq!(svc.confidence, Confidence::Low);
        }
    }

    #[test]
    fn two_instances_with_distinct_pids_stay_separate() {
        let services = correlate(vec![
            process_candidate(ServiceKind::Mysql, 100),
            port_candidate(ServiceKind::Mysql, 3306, Some(100)),
            process_candidate(ServiceKind::Mysql, 200),
            port_candidate(ServiceKind::Mysql, 3307, Some(200)),
        ]);

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].primary_endpoint().unwrap().port, 3306);
        assert_eq!(services[0].process_info.as_ref().unwrap().pid, 100);
        assert_eq!(services[1].primary_endpoint().unwrap().port, 3307);
        assert_eq!(services[1].process_info.as_ref().unwrap().pid, 200);
    }

    #[test]
    fn same_pid_merges_multiple_listen_ports() {
        // One elasticsearch process listening on 9200 and 9300.
        let services = correlate(vec![
            port_candidate(ServiceKind::Elasticsearch, 9200, Some(5)),
            port_candidate(ServiceKind::Elasticsearch, 9300, Some(5)),
        ]);

        assert_eq!(services.len(), 1);
        assert_eq!(services[0].endpoints.len(), 2);
        assert_eq!(services[0].primary_endpoint().unwrap().port, 9200);
    }

    #[test]
    fn signal_only_candidates_attach_to_the_primary_instance() {
        let mut config = Candidate::new(ServiceKind::Mysql, DiscoverySignal::ConfigFile);
        config.config_paths.push("/etc/mysql".into());

        let services = correlate(vec![
            port_candidate(ServiceKind::Mysql, 3306, None),
            port_candidate(ServiceKind::Mysql, 3307, None),
            config,
        ]);

        assert_eq!(services.len(), 2);
        let primary = &services[0];
        assert_eq!(primary.primary_endpoint().unwrap().port, 3306);
        assert!(primary.discovered_by.contains(&DiscoverySignal::ConfigFile));
        assert_eq!(primary.confidence, Confidence::Medium);
        assert_eq!(services[1].discovered_by.len(), 1);
    }

    #[test]
    fn port_tie_break_prefers_process_signal() {
        // Port 8080 maps to apache in the static table, but the process that
        // owns the socket was identified as nginx.
        let services = correlate(vec![
            process_candidate(ServiceKind::Nginx, 7),
            port_candidate(ServiceKind::Apache, 8080, Some(7)),
        ]);

        assert_eq!(services.len(), 1);
        assert_eq!(services[0].kind, ServiceKind::Nginx);
        assert_eq!(services[0].discovered_by.len(), 2);
    }

    #[test]
    fn distinct_kinds_stay_separate() {
        let services = correlate(vec![
            process_candidate(ServiceKind::Mysql, 1),
            process_candidate(ServiceKind::Redis, 2),
        ]);
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn duplicate_endpoints_dedupe() {
        let services = correlate(vec![
            port_candidate(ServiceKind::Redis, 6379, None),
            port_candidate(ServiceKind::Redis, 6379, None),
        ]);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].endpoints.len(), 1);
    }

    #[test]
    fn output_is_sorted_by_kind() {
        let services = correlate(vec![
            process_candidate(ServiceKind::Redis, 2),
            process_candidate(ServiceKind::Mysql, 1),
        ]);
        assert_eq!(services[0].kind, ServiceKind::Mysql);
        assert_eq!(services[1].kind, ServiceKind::Redis);
    }
}
