//! Service directory store
//!
//! Canonical table of advertised services plus the bijective id/name indices.
//! Submitting directory entries returns `DirectoryChange` notifications which
//! the engine applies to the affected sessions (service deletion, closed-recover
//! state and item-group changes).

use hashbrown::HashMap;
use std::collections::BTreeMap;

#[cfg(not(feature = "std"))]
use log::{debug, warn};
#[cfg(feature = "std")]
use tracing::{debug, warn};

use crate::config::AdminControl;
use crate::directory::service::{
    FilterEntry, MapAction, Service, ServiceGroupState, ServiceInfo, ServiceState, ServiceUpdate,
};
use crate::errors::DirectoryError;
use crate::types::{DomainType, Qos, ServiceId};

/// Name and id of the service advertised when nothing else is configured
pub const DEFAULT_SERVICE_NAME: &str = "DIRECT_FEED";
pub const DEFAULT_SERVICE_ID: ServiceId = ServiceId(1);

// ----------------------------------------------------------------------------
// Directory Change Notifications
// ----------------------------------------------------------------------------

/// Effect of a directory submission on open items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    ServiceDeleted {
        service_id: ServiceId,
    },
    ServiceStateChanged {
        service_id: ServiceId,
        state: ServiceState,
    },
    GroupChanged {
        service_id: ServiceId,
        group: ServiceGroupState,
    },
}

// ----------------------------------------------------------------------------
// Service Directory Store
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceDirectoryStore {
    control: AdminControl,
    services: BTreeMap<ServiceId, Service>,
    id_to_name: HashMap<ServiceId, String>,
    name_to_id: HashMap<String, ServiceId>,
}

impl ServiceDirectoryStore {
    /// Create an empty store
    pub fn new(control: AdminControl) -> Self {
        Self {
            control,
            services: BTreeMap::new(),
            id_to_name: HashMap::new(),
            name_to_id: HashMap::new(),
        }
    }

    /// Create a store advertising only the default service
    pub fn with_default_service(control: AdminControl) -> Self {
        let mut store = Self::new(control);
        store.populate_default_service();
        store
    }

    pub fn admin_control(&self) -> AdminControl {
        self.control
    }

    /// Install `DIRECT_FEED` with id 1
    pub fn populate_default_service(&mut self) {
        let mut service = Service::new(DEFAULT_SERVICE_ID);
        service.info = Some(ServiceInfo {
            name: DEFAULT_SERVICE_NAME.to_string(),
            vendor: None,
            is_source: false,
            capabilities: vec![
                DomainType::DICTIONARY,
                DomainType::MARKET_PRICE,
                DomainType::MARKET_BY_ORDER,
                DomainType::MARKET_BY_PRICE,
                DomainType::MARKET_MAKER,
            ],
            dictionaries_provided: vec!["RWFFld".into(), "RWFEnum".into()],
            dictionaries_used: vec!["RWFFld".into(), "RWFEnum".into()],
            qos: vec![Qos::REALTIME_TICK_BY_TICK],
            supports_qos_range: true,
            item_list: None,
            supports_out_of_band_snapshots: false,
            accepting_consumer_status: false,
        });
        service.state = Some(ServiceState::up());

        self.id_to_name
            .insert(DEFAULT_SERVICE_ID, DEFAULT_SERVICE_NAME.to_string());
        self.name_to_id
            .insert(DEFAULT_SERVICE_NAME.to_string(), DEFAULT_SERVICE_ID);
        self.services.insert(DEFAULT_SERVICE_ID, service);
    }

    /// Add a fully-formed service, enforcing id and name uniqueness
    pub fn add_service(&mut self, service: Service) -> Result<(), DirectoryError> {
        let name = service
            .name()
            .ok_or(DirectoryError::MissingServiceInfo {
                service_id: service.service_id.0 as u64,
            })?
            .to_string();
        self.check_existing_service_id(service.service_id, &name)?;
        if self.name_to_id.contains_key(&name) {
            return Err(DirectoryError::DuplicateServiceName {
                name,
                service_id: service.service_id.0 as u64,
            });
        }
        self.id_to_name.insert(service.service_id, name.clone());
        self.name_to_id.insert(name, service.service_id);
        self.services.insert(service.service_id, service);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Id / Name Indices
    // ------------------------------------------------------------------------

    pub fn check_existing_service_id(
        &self,
        service_id: ServiceId,
        name: &str,
    ) -> Result<(), DirectoryError> {
        if self.id_to_name.contains_key(&service_id) {
            return Err(DirectoryError::DuplicateServiceId {
                name: name.to_string(),
                service_id: service_id.0 as u64,
            });
        }
        Ok(())
    }

    /// Record an id/name pair. Under API control a duplicate name is an error;
    /// under user control an existing pair is left untouched.
    pub fn add_service_id_and_name_pair(
        &mut self,
        service_id: ServiceId,
        name: &str,
    ) -> Result<(), DirectoryError> {
        if self.name_to_id.contains_key(name) || self.id_to_name.contains_key(&service_id) {
            return match self.control {
                AdminControl::Api => Err(DirectoryError::DuplicateServiceName {
                    name: name.to_string(),
                    service_id: service_id.0 as u64,
                }),
                AdminControl::User => Ok(()),
            };
        }

        debug!(
            "Detected Service with name of {} and Id of {}",
            name, service_id
        );
        self.id_to_name.insert(service_id, name.to_string());
        self.name_to_id.insert(name.to_string(), service_id);
        Ok(())
    }

    fn remove_service_id_and_name(&mut self, service_id: ServiceId) {
        if let Some(name) = self.id_to_name.remove(&service_id) {
            self.name_to_id.remove(&name);
        }
    }

    pub fn service_name_by_id(&self, service_id: ServiceId) -> Option<&str> {
        self.id_to_name.get(&service_id).map(String::as_str)
    }

    pub fn service_id_by_name(&self, name: &str) -> Option<ServiceId> {
        self.name_to_id.get(name).copied()
    }

    /// Resolve a service name, failing when it is not advertised
    pub fn resolve_service_name(&self, name: &str) -> Result<ServiceId, DirectoryError> {
        self.service_id_by_name(name)
            .ok_or_else(|| DirectoryError::UnknownServiceName {
                name: name.to_string(),
            })
    }

    /// Fail when `service_id` is not advertised
    pub fn validate_service_id(&self, service_id: ServiceId) -> Result<(), DirectoryError> {
        if self.id_to_name.contains_key(&service_id) || self.services.contains_key(&service_id) {
            Ok(())
        } else {
            Err(DirectoryError::UnknownServiceId {
                service_id: service_id.0 as u64,
            })
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn service(&self, service_id: ServiceId) -> Option<&Service> {
        self.services.get(&service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn is_accepting_requests(&self, service_id: ServiceId) -> bool {
        self.services
            .get(&service_id)
            .map(Service::is_accepting_requests)
            .unwrap_or(false)
    }

    /// Whether the service can serve the requested QoS (or QoS range)
    pub fn is_valid_qos_range(
        &self,
        service_id: ServiceId,
        qos: Option<&Qos>,
        worst_qos: Option<&Qos>,
    ) -> bool {
        let Some(service) = self.services.get(&service_id) else {
            return false;
        };
        let Some(info) = service.info.as_ref() else {
            return true;
        };

        let default_qos = [Qos::REALTIME_TICK_BY_TICK];
        let offered: &[Qos] = if info.qos.is_empty() {
            &default_qos
        } else {
            &info.qos
        };

        match (qos, worst_qos) {
            (Some(best), Some(worst)) if info.supports_qos_range => {
                offered.iter().any(|q| q.is_in_range(best, worst))
            }
            (Some(wanted), _) => offered.iter().any(|q| q == wanted),
            (None, _) => offered.contains(&Qos::REALTIME_TICK_BY_TICK),
        }
    }

    /// Directory entries for every stored service (or one) restricted to `request_filter`
    pub fn snapshot(&self, request_filter: u32, specific: Option<ServiceId>) -> Vec<ServiceUpdate> {
        self.services
            .values()
            .filter(|s| specific.map(|id| id == s.service_id).unwrap_or(true))
            .map(|s| s.to_update(request_filter))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Apply submitted directory entries.
    ///
    /// With `store` set the service table is mutated (API admin control); otherwise
    /// only id/name pairs are recorded and the notifications are derived from the
    /// entries themselves. The entries apply as one batch: when any of them fails
    /// the store is left as it was.
    pub fn submit(
        &mut self,
        updates: &[ServiceUpdate],
        store: bool,
    ) -> Result<Vec<DirectoryChange>, DirectoryError> {
        let mut ids = Vec::with_capacity(updates.len());
        for update in updates {
            let id = ServiceId::from_wire(update.service_id).ok_or(
                DirectoryError::ServiceIdOutOfRange {
                    service_id: update.service_id,
                },
            )?;
            ids.push(id);
        }

        let mut staged = self.clone();
        let mut changes = Vec::new();
        for (update, service_id) in updates.iter().zip(ids) {
            if store {
                staged.store_update(service_id, update, &mut changes)?;
            } else {
                staged.observe_update(service_id, update, &mut changes)?;
            }
        }
        *self = staged;
        Ok(changes)
    }

    fn observe_update(
        &mut self,
        service_id: ServiceId,
        update: &ServiceUpdate,
        changes: &mut Vec<DirectoryChange>,
    ) -> Result<(), DirectoryError> {
        match update.action {
            MapAction::Add | MapAction::Update => {
                if let Some(info) = update.info.as_ref() {
                    self.add_service_id_and_name_pair(service_id, &info.value.name)?;
                }
                if let Some(state) = update.state.as_ref() {
                    changes.push(DirectoryChange::ServiceStateChanged {
                        service_id,
                        state: state.value.clone(),
                    });
                }
                notify_groups(service_id, &update.groups, changes);
            }
            MapAction::Delete => {
                changes.push(DirectoryChange::ServiceDeleted { service_id });
            }
        }
        Ok(())
    }

    fn store_update(
        &mut self,
        service_id: ServiceId,
        update: &ServiceUpdate,
        changes: &mut Vec<DirectoryChange>,
    ) -> Result<(), DirectoryError> {
        match update.action {
            MapAction::Add => {
                if self.services.contains_key(&service_id) {
                    debug!("Ignoring add of existing service {}", service_id);
                    return Ok(());
                }
                if let Some(info) = update.info.as_ref() {
                    self.check_existing_service_id(service_id, &info.value.name)?;
                    self.add_service_id_and_name_pair(service_id, &info.value.name)?;
                }

                let mut service = Service::new(service_id);
                if let Some(state) = update.state.as_ref() {
                    service.apply_state(&FilterEntry::set(state.value.clone()));
                    changes.push(DirectoryChange::ServiceStateChanged {
                        service_id,
                        state: state.value.clone(),
                    });
                }
                service.info = update.info.as_ref().map(|i| i.value.clone());
                if let Some(load) = update.load.as_ref() {
                    service.apply_load(load);
                }
                if let Some(links) = update.links.as_ref() {
                    service.apply_links(links);
                }
                for group in &update.groups {
                    service.record_group_state(group);
                }
                notify_groups(service_id, &update.groups, changes);

                if service.info.is_some() || service.state.is_some() {
                    self.services.insert(service_id, service);
                } else {
                    warn!(
                        "Service {} added without info or state filter is not stored",
                        service_id
                    );
                }
            }
            MapAction::Delete => {
                self.services.remove(&service_id);
                self.remove_service_id_and_name(service_id);
                changes.push(DirectoryChange::ServiceDeleted { service_id });
            }
            MapAction::Update => {
                let Some(service) = self.services.get_mut(&service_id) else {
                    debug!("Ignoring update of unknown service {}", service_id);
                    return Ok(());
                };
                if let Some(info) = update.info.as_ref() {
                    service.info = Some(info.value.clone());
                }
                if let Some(state) = update.state.as_ref() {
                    service.apply_state(state);
                    if let Some(current) = service.state.clone() {
                        changes.push(DirectoryChange::ServiceStateChanged {
                            service_id,
                            state: current,
                        });
                    }
                }
                if let Some(load) = update.load.as_ref() {
                    service.apply_load(load);
                }
                if let Some(links) = update.links.as_ref() {
                    service.apply_links(links);
                }
                for group in &update.groups {
                    service.record_group_state(group);
                }
                notify_groups(service_id, &update.groups, changes);
            }
        }
        Ok(())
    }
}

fn notify_groups(
    service_id: ServiceId,
    groups: &[ServiceGroupState],
    changes: &mut Vec<DirectoryChange>,
) {
    changes.extend(groups.iter().map(|group| DirectoryChange::GroupChanged {
        service_id,
        group: group.clone(),
    }));
}
