//! # Gossip Peer Scoring
//!
//! The network's fixed GossipSub v1.1 parameter set. Every node must use the
//! same values or mesh health degrades.
//!
//! | Component | Meaning                          | Weight                |
//! |-----------|----------------------------------|-----------------------|
//! | P1        | Time in mesh                     | 0.0324                |
//! | P2        | First message deliveries         | 0.05                  |
//! | P3        | Mesh message delivery deficit²   | -0.026                |
//! | P3b       | Mesh failure penalty             | -0.0026               |
//! | P4        | Invalid message deliveries²      | -99                   |
//! | P5        | Application specific             | 1                     |
//! | P6        | IP colocation surplus²           | -35.11 (0 in testing) |
//! | P7        | Behaviour penalty excess²        | -15.92                |
//!
//! | Threshold           | Value   |
//! |---------------------|---------|
//! | gossip              | -4000   |
//! | publish             | -8000   |
//! | graylist            | -16000  |
//! | accept PX           | 100     |
//! | opportunistic graft | 5       |

use std::time::Duration;

use libp2p::gossipsub;

/// Number of participants the per-topic delivery caps are scaled to.
const EXPECTED_PARTICIPANTS: f64 = 200.0;

/// Score parameters applied to every subscribed topic.
pub fn topic_score_params() -> gossipsub::TopicScoreParams {
    let n = EXPECTED_PARTICIPANTS;
    let mut params = gossipsub::TopicScoreParams::default();
    params.topic_weight = 1.0;

    params.time_in_mesh_weight = 0.0324;
    params.time_in_mesh_quantum = Duration::from_secs(12);
    params.time_in_mesh_cap = 300.0;

    params.first_message_deliveries_weight = 0.05;
    params.first_message_deliveries_decay = 0.631;
    params.first_message_deliveries_cap = n / 755.712;

    params.mesh_message_deliveries_weight = -0.026;
    params.mesh_message_deliveries_decay = 0.631;
    params.mesh_message_deliveries_cap = n / 94.464;
    params.mesh_message_deliveries_threshold = n / 377.856;
    params.mesh_message_deliveries_window = Duration::from_millis(200);
    params.mesh_message_deliveries_activation = Duration::from_secs(4 * 12);

    params.mesh_failure_penalty_weight = -0.0026;
    params.mesh_failure_penalty_decay = 0.631;

    params.invalid_message_deliveries_weight = -99.0;
    params.invalid_message_deliveries_decay = 0.9994;
    params
}

/// Global score parameters. Topic parameters are added per subscription.
/// `testing` disables the IP colocation penalty.
pub fn peer_score_params(testing: bool) -> gossipsub::PeerScoreParams {
    let mut params = gossipsub::PeerScoreParams::default();
    params.topic_score_cap = 32.72;
    params.app_specific_weight = 1.0;

    params.ip_colocation_factor_weight = if testing { 0.0 } else { -35.11 };
    params.ip_colocation_factor_threshold = 10.0;

    params.behaviour_penalty_weight = -15.92;
    params.behaviour_penalty_threshold = 6.0;
    params.behaviour_penalty_decay = 0.928;

    params.decay_interval = Duration::from_secs(12);
    params.decay_to_zero = 0.01;
    params.retain_score = Duration::from_secs(12 * 60 * 60);
    params
}

pub fn peer_score_thresholds() -> gossipsub::PeerScoreThresholds {
    gossipsub::PeerScoreThresholds {
        gossip_threshold: -4000.0,
        publish_threshold: -8000.0,
        graylist_threshold: -16000.0,
        accept_px_threshold: 100.0,
        opportunistic_graft_threshold: 5.0,
    }
}

/// Score contribution of `count` rejected messages on one topic.
pub fn invalid_message_penalty(count: u32) -> f64 {
    let params = topic_score_params();
    let count = f64::from(count);
    count * count * params.invalid_message_deliveries_weight * params.topic_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use rs_01_p2p_schema::Topic;

    #[test]
    fn test_exact_network_parameters() {
        let p = peer_score_params(false);
        assert_eq!(p.topic_score_cap, 32.72);
        assert_eq!(p.ip_colocation_factor_weight, -35.11);
        assert_eq!(p.ip_colocation_factor_threshold, 10.0);
        assert_eq!(p.behaviour_penalty_weight, -15.92);
        assert_eq!(p.behaviour_penalty_threshold, 6.0);
        assert_eq!(p.decay_interval, Duration::from_secs(12));
        assert_eq!(p.retain_score, Duration::from_secs(43200));
        assert!(p.topics.is_empty());
        assert_eq!(peer_score_params(true).ip_colocation_factor_weight, 0.0);

        let t = topic_score_params();
        assert_eq!(t.first_message_deliveries_cap, 200.0 / 755.712);
        assert_eq!(t.mesh_message_deliveries_cap, 200.0 / 94.464);
        assert_eq!(t.mesh_message_deliveries_threshold, 200.0 / 377.856);
        assert_eq!(t.mesh_message_deliveries_activation, Duration::from_secs(48));
        assert_eq!(t.invalid_message_deliveries_weight, -99.0);
        assert_eq!(t.invalid_message_deliveries_decay, 0.9994);

        let thresholds = peer_score_thresholds();
        assert_eq!(thresholds.gossip_threshold, -4000.0);
        assert_eq!(thresholds.publish_threshold, -8000.0);
        assert_eq!(thresholds.graylist_threshold, -16000.0);
        assert_eq!(thresholds.accept_px_threshold, 100.0);
        assert_eq!(thresholds.opportunistic_graft_threshold, 5.0);
    }

    #[test]
    fn test_parameters_accepted_by_gossipsub() {
        let key = libp2p::identity::Keypair::generate_ed25519();
        let config = gossipsub::ConfigBuilder::default().build().unwrap();
        let mut behaviour: gossipsub::Behaviour =
            gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(key), config).unwrap();
        behaviour
            .with_peer_score(peer_score_params(false), peer_score_thresholds())
            .unwrap();
        behaviour
            .set_topic_params(
                gossipsub::IdentTopic::new(Topic::DecryptionKeys.as_str()),
                topic_score_params(),
            )
            .unwrap();
    }

    #[test]
    fn test_graylist_reached_on_thirteenth_invalid_message() {
        let thresholds = peer_score_thresholds();
        assert_eq!(invalid_message_penalty(1), -99.0);
        assert_eq!(invalid_message_penalty(2), -396.0);

        let twelve = invalid_message_penalty(12);
        assert!(twelve < thresholds.publish_threshold);
        assert!(twelve > thresholds.graylist_threshold);
        assert!(invalid_message_penalty(13) < thresholds.graylist_threshold);
    }
}
