//! Ports - Firewall port-list reconciliation
//!
//! Each port family (TCP, UDP) is managed in one of two modes:
//!
//! - explicit (`tcp`, `udp`): the configured list replaces the remote list
//! - ensure (`ensure_tcp`, `ensure_udp`): the configured ports are merged into
//!   the remote list, and only those ports are removed again on destroy

use crate::error::{ProviderError, ProviderResult};
use crate::resource::{Record, Value};

/// Sorted, deduplicated union of `current` and `ensure`
pub fn merge_ports(current: &[u16], ensure: &[u16]) -> Vec<u16> {
    let mut merged: Vec<u16> = current.iter().chain(ensure).copied().collect();
    merged.sort_unstable();
    merged.dedup();
    merged
}

/// `current` without the ports in `ensured`, order preserved
pub fn prune_ports(current: &[u16], ensured: &[u16]) -> Vec<u16> {
    current
        .iter()
        .filter(|p| !ensured.contains(p))
        .copied()
        .collect()
}

/// Port lists of both families, as held remotely
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallPorts {
    pub tcp: Vec<u16>,
    pub udp: Vec<u16>,
}

/// How one port family is managed by a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PortMode {
    #[default]
    Unset,
    Explicit(Vec<u16>),
    Ensure(Vec<u16>),
}

impl PortMode {
    fn on_apply(&self, current: &[u16]) -> Vec<u16> {
        match self {
            PortMode::Unset => current.to_vec(),
            PortMode::Explicit(ports) => merge_ports(&[], ports),
            PortMode::Ensure(ports) => merge_ports(current, ports),
        }
    }

    fn on_destroy(&self, current: &[u16], clear_on_destroy: bool) -> Vec<u16> {
        match self {
            PortMode::Ensure(ports) => prune_ports(current, ports),
            PortMode::Explicit(_) if clear_on_destroy => Vec::new(),
            _ => current.to_vec(),
        }
    }
}

/// Port modes of a firewall-exceptions record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortPlan {
    pub tcp: PortMode,
    pub udp: PortMode,
    pub clear_on_destroy: bool,
}

impl PortPlan {
    /// Read the plan from the record's current attributes
    pub fn from_record(record: &Record) -> ProviderResult<Self> {
        Ok(Self {
            tcp: mode_of(record, "tcp", "ensure_tcp")?,
            udp: mode_of(record, "udp", "ensure_udp")?,
            clear_on_destroy: record.get_bool_or("clear_on_destroy", false),
        })
    }

    /// Remote lists to write on create or update
    pub fn desired_on_apply(&self, current: &FirewallPorts) -> FirewallPorts {
        FirewallPorts {
            tcp: self.tcp.on_apply(&current.tcp),
            udp: self.udp.on_apply(&current.udp),
        }
    }

    /// Remote lists to write on destroy; `None` when nothing would change
    pub fn desired_on_destroy(&self, current: &FirewallPorts) -> Option<FirewallPorts> {
        let desired = FirewallPorts {
            tcp: self.tcp.on_destroy(&current.tcp, self.clear_on_destroy),
            udp: self.udp.on_destroy(&current.udp, self.clear_on_destroy),
        };
        (desired != *current).then_some(desired)
    }
}

fn mode_of(record: &Record, explicit: &str, ensure: &str) -> ProviderResult<PortMode> {
    let explicit_ports = record.get(explicit).filter(|v| !v.is_empty());
    let ensure_ports = record.get(ensure).filter(|v| !v.is_empty());
    match (explicit_ports, ensure_ports) {
        (Some(_), Some(_)) => Err(ProviderError::validation(format!(
            "'{}' conflicts with '{}'",
            explicit, ensure
        ))),
        (Some(v), None) => Ok(PortMode::Explicit(ports_of(explicit, v)?)),
        (None, Some(v)) => Ok(PortMode::Ensure(ports_of(ensure, v)?)),
        (None, None) => Ok(PortMode::Unset),
    }
}

fn ports_of(name: &str, value: &Value) -> ProviderResult<Vec<u16>> {
    value
        .items()
        .iter()
        .map(|item| {
            item.as_int()
                .filter(|n| (1..=65535).contains(n))
                .map(|n| n as u16)
                .ok_or_else(|| {
                    ProviderError::validation(format!(
                        "'{}' must only contain ports between 1 and 65535",
                        name
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new("hsdp_edge_app_firewall_exceptions")
    }

    #[test]
    fn merge_is_sorted_union() {
        assert_eq!(merge_ports(&[443, 22, 80], &[80, 8080, 1]), vec![1, 22, 80, 443, 8080]);
    }

    #[test]
    fn prune_removes_only_ensured() {
        assert_eq!(prune_ports(&[22, 80, 443, 8080], &[80, 443]), vec![22, 8080]);
        assert_eq!(prune_ports(&[22], &[80]), vec![22]);
    }

    #[test]
    fn ensure_mode_destroy_prunes_introduced_ports() {
        let r = record()
            .with_attribute("ensure_tcp", Value::int_list([80, 443]))
            .with_attribute("clear_on_destroy", Value::Bool(true));
        let plan = PortPlan::from_record(&r).unwrap();
        let current = FirewallPorts {
            tcp: vec![22, 80, 443, 8080],
            udp: vec![53],
        };
        let desired = plan.desired_on_destroy(&current).unwrap();
        assert_eq!(desired.tcp, vec![22, 8080]);
        assert_eq!(desired.udp, vec![53]);
    }

    #[test]
    fn ensure_mode_apply_merges() {
        let r = record().with_attribute("ensure_udp", Value::int_list([53, 123]));
        let plan = PortPlan::from_record(&r).unwrap();
        let current = FirewallPorts {
            tcp: vec![22],
            udp: vec![500, 53],
        };
        let desired = plan.desired_on_apply(&current);
        assert_eq!(desired.tcp, vec![22]);
        assert_eq!(desired.udp, vec![53, 123, 500]);
    }

    #[test]
    fn explicit_mode_clears_only_when_asked() {
        let current = FirewallPorts {
            tcp: vec![22, 80],
            udp: vec![],
        };
        let r = record().with_attribute("tcp", Value::int_list([80, 22]));
        let plan = PortPlan::from_record(&r).unwrap();
        assert_eq!(plan.desired_on_apply(&current).tcp, vec![22, 80]);
        assert_eq!(plan.desired_on_destroy(&current), None);

        let r = r.with_attribute("clear_on_destroy", Value::Bool(true));
        let plan = PortPlan::from_record(&r).unwrap();
        assert_eq!(
            plan.desired_on_destroy(&current),
            Some(FirewallPorts::default())
        );
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        let r = record()
            .with_attribute("tcp", Value::int_list([22]))
            .with_attribute("ensure_tcp", Value::int_list([80]));
        let err = PortPlan::from_record(&r).unwrap_err();
        assert!(err.to_string().contains("'tcp' conflicts with 'ensure_tcp'"));
    }

    #[test]
    fn rejects_out_of_range_ports() {
        let r = record().with_attribute("ensure_udp", Value::int_list([0]));
        assert!(PortPlan::from_record(&r).is_err());
        let r = record().with_attribute("tcp", Value::int_list([65536]));
        assert!(PortPlan::from_record(&r).is_err());
    }
}
