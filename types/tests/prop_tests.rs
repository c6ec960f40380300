use proptest::prelude::*;

use flood_types::{Contact, ContactRole, Endpoint, InterfaceName, NodeId};
use std::net::{IpAddr, Ipv4Addr};

fn endpoint(octets: [u8; 4], port: u16) -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::from(octets)), port)
}

proptest! {
    /// Contacts compare equal iff their node ids do, whatever the endpoints.
    #[test]
    fn contact_equality_follows_node_id(
        a in 0u64..64,
        b in 0u64..64,
        ip_a in prop::array::uniform4(0u8..),
        ip_b in prop::array::uniform4(0u8..),
        port in 1u16..,
    ) {
        let ca = Contact::peer(NodeId::new(a), endpoint(ip_a, port));
        let cb = Contact::peer(NodeId::new(b), endpoint(ip_b, port));
        prop_assert_eq!(ca == cb, a == b);
        prop_assert_eq!(ca.cmp(&cb), a.cmp(&b));
    }

    /// Size estimate tracks endpoint mutations.
    #[test]
    fn transmission_size_tracks_mutations(id in any::<u64>(), port in 1u16..) {
        let mut contact = Contact::new(NodeId::new(id), ContactRole::Peer);
        prop_assert_eq!(contact.transmission_size(), 8);
        contact.add_endpoint(InterfaceName::Mobile, endpoint([1, 2, 3, 4], port));
        prop_assert_eq!(contact.transmission_size(), 14);
        contact.remove_endpoint(InterfaceName::Mobile);
        prop_assert_eq!(contact.transmission_size(), 8);
    }

    /// NodeId bincode serialization roundtrip.
    #[test]
    fn node_id_bincode_roundtrip(raw in any::<u64>()) {
        let id = NodeId::new(raw);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: NodeId = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, id);
    }
}
