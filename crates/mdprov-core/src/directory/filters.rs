//! Per-recipient directory filtering

use crate::directory::service::{MapAction, ServiceUpdate};
use crate::message::filter;
use crate::types::ServiceId;

/// Directory entries restricted to what one consumer asked for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteredDirectory {
    pub services: Vec<ServiceUpdate>,
    /// Filter bits actually present in the response
    pub filter: u32,
}

/// Restrict `updates` to the filter bits and service a consumer requested.
///
/// Delete entries are carried as a bare action. When a specific service was
/// requested and it is not among `updates`, the result holds no services.
pub fn encode_directory_msg(
    updates: &[ServiceUpdate],
    request_filter: u32,
    specific_service: Option<ServiceId>,
) -> FilteredDirectory {
    let mut out = FilteredDirectory::default();

    for update in updates {
        if let Some(wanted) = specific_service {
            if update.service_id != wanted.0 as u64 {
                continue;
            }
        }
        out.services.push(encode_service(update, request_filter, &mut out.filter));
    }

    out
}

fn encode_service(update: &ServiceUpdate, request_filter: u32, response_filter: &mut u32) -> ServiceUpdate {
    let mut encoded = ServiceUpdate::new(update.service_id, update.action);
    if update.action == MapAction::Delete {
        return encoded;
    }

    if request_filter & filter::INFO != 0 && update.info.is_some() {
        encoded.info = update.info.clone();
        *response_filter |= filter::INFO;
    }
    if request_filter & filter::STATE != 0 && update.state.is_some() {
        encoded.state = update.state.clone();
        *response_filter |= filter::STATE;
    }
    if request_filter & filter::GROUP != 0 && !update.groups.is_empty() {
        encoded.groups = update.groups.clone();
        *response_filter |= filter::GROUP;
    }
    if request_filter & filter::LOAD != 0 && update.load.is_some() {
        encoded.load = update.load.clone();
        *response_filter |= filter::LOAD;
    }
    if request_filter & filter::LINK != 0 && update.links.is_some() {
        encoded.links = update.links.clone();
        *response_filter |= filter::LINK;
    }

    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::service::{FilterAction, ServiceInfo, ServiceLoad, ServiceState};

    fn full_update(id: u64) -> ServiceUpdate {
        ServiceUpdate::new(id, MapAction::Add)
            .with_info(ServiceInfo {
                name: format!("SVC{}", id),
                ..ServiceInfo::default()
            })
            .with_state(FilterAction::Set, ServiceState::up())
            .with_load(FilterAction::Set, ServiceLoad::default())
    }

    #[test]
    fn test_filter_drops_unrequested_filters() {
        let updates = vec![full_update(1), full_update(2)];
        let out = encode_directory_msg(&updates, filter::INFO | filter::STATE, None);

        assert_eq!(out.services.len(), 2);
        assert_eq!(out.filter, filter::INFO | filter::STATE);
        assert!(out.services.iter().all(|s| s.load.is_none()));
    }

    #[test]
    fn test_specific_service_selection() {
        let updates = vec![full_update(1), full_update(2)];
        let out = encode_directory_msg(&updates, filter::ALL, Some(ServiceId(2)));
        assert_eq!(out.services.len(), 1);
        assert_eq!(out.services[0].service_id, 2);

        let none = encode_directory_msg(&updates, filter::ALL, Some(ServiceId(5)));
        assert!(none.services.is_empty());
        assert_eq!(none.filter, 0);
    }

    #[test]
    fn test_delete_entries_are_bare() {
        let mut delete = full_update(4);
        delete.action = MapAction::Delete;
        let out = encode_directory_msg(&[delete], filter::ALL, None);

        assert_eq!(out.services[0].filter_mask(), 0);
        assert_eq!(out.services[0].action, MapAction::Delete);
    }
}
