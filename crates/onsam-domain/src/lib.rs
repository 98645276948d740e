pub mod error;
pub mod types;

pub use error::OnsError;
pub use types::{
    create_roadm_urn, create_xconn_id, decode_roadm_urn, Allocation, ClientInfo, DeviceKey,
    GeniResource, GeniRoadmDetails, Operational,
};
