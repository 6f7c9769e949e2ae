use shared_state::records::avatar_collection;
use shared_state::records::selection_collection;
use shared_state::records::AvatarComponent;
use shared_state::records::AvatarRecord;
use shared_state::records::SelectionRecord;

use crate::common::server_config;
use crate::common::wait_until;
use crate::common::TestServer;

fn avatar(player_id: &str) -> AvatarRecord {
    AvatarRecord {
        player_id: player_id.to_string(),
        components: vec![AvatarComponent {
            name: "head".to_string(),
            position: Some([0.0, 1.6, 0.0]),
            rotation: Some([0.0, 0.0, 0.0, 1.0]),
        }],
    }
}

#[tokio::test]
async fn records_flow_between_sessions() {
    let server = TestServer::start(server_config()).await;
    let alice = server.session().await;
    let bob = server.session().await;
    let mine = avatar_collection(&alice);
    let theirs = avatar_collection(&bob);

    let record = avatar("p1");
    mine.update_value(&record.key(), &record).unwrap();
    wait_until(|| theirs.get(&record.key()) == Some(record.clone())).await;

    mine.remove_value(&record.key()).unwrap();
    wait_until(|| theirs.is_empty()).await;

    server.stop().await;
}

#[tokio::test]
async fn malformed_entries_are_filtered() {
    let server = TestServer::start(server_config()).await;
    let session = server.session().await;
    let selections = selection_collection(&session);

    let selection = SelectionRecord {
        id: "s1".to_string(),
        name: "ligand".to_string(),
        particle_ids: Some(vec![1, 2, 3]),
        hidden: false,
        interactable: true,
    };
    selections.update_value(&selection.key(), &selection).unwrap();
    session.set_shared_state("selection.broken", "not a record");

    wait_until(|| session.contains_key("selection.broken")).await;
    wait_until(|| selections.len() == 1).await;
    assert_eq!(selections.get("selection.s1"), Some(selection));
    assert_eq!(selections.rejected_keys(), vec!["selection.broken".to_string()]);

    server.stop().await;
}
