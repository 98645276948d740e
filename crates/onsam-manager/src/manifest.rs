use chrono::{DateTime, Utc};
use onsam_domain::{
    create_roadm_urn, Allocation, GeniResource, GeniRoadmDetails, Operational,
};
use onsam_store::{ResourceView, SliceEntry};

use crate::manager::ReserveRequest;

/// One GeniResource per endpoint row, for advertisement listings.
pub fn resource_manifest(views: &[ResourceView]) -> Vec<GeniResource> {
    views
        .iter()
        .map(|v| {
            GeniResource::new(
                create_roadm_urn(&v.name, &v.endpoint, &v.label),
                v.slice_urn.clone(),
                v.end_time,
                &v.rtype,
                v.allocation,
                v.operational,
            )
        })
        .collect()
}

/// The flat manifest returned right after a reservation: two entries per
/// requested cross-connect, both allocated and ready.
pub fn allocation_manifest(
    requests: &[ReserveRequest],
    slice_urn: &str,
    end_time: DateTime<Utc>,
) -> Vec<GeniResource> {
    let mut out = Vec::with_capacity(requests.len() * 2);
    for r in requests {
        for (endpoint, label) in [(&r.in_endpoint, &r.in_label), (&r.out_endpoint, &r.out_label)] {
            out.push(GeniResource::new(
                create_roadm_urn(&r.name, endpoint, label),
                Some(slice_urn.to_string()),
                Some(end_time),
                &r.rtype,
                Allocation::Allocated,
                Operational::Ready,
            ));
        }
    }
    out
}

/// The detailed manifest for slice queries: two entries per connection with
/// requester identity and cross-linked peer urns.
pub fn detailed_manifest(entries: &[SliceEntry]) -> Vec<GeniResource> {
    let mut out = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        let in_urn =
            create_roadm_urn(&entry.ingress.name, &entry.ingress.endpoint, &entry.ingress.label);
        let out_urn =
            create_roadm_urn(&entry.egress.name, &entry.egress.endpoint, &entry.egress.label);

        out.push(
            GeniResource::new(
                in_urn.clone(),
                Some(entry.conn.slice_urn.clone()),
                Some(entry.conn.end_time),
                &entry.ingress.rtype,
                entry.ingress.allocation,
                entry.ingress.operational,
            )
            .with_details(GeniRoadmDetails::new(&entry.conn.client).connected_out(&out_urn)),
        );
        out.push(
            GeniResource::new(
                out_urn,
                Some(entry.conn.slice_urn.clone()),
                Some(entry.conn.end_time),
                &entry.egress.rtype,
                entry.egress.allocation,
                entry.egress.operational,
            )
            .with_details(GeniRoadmDetails::new(&entry.conn.client).connected_in(&in_urn)),
        );
    }
    out
}
