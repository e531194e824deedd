//! Symbol registry behavior driven from merge outcomes: when a topic merge
//! completes, symbols minted for the losing topics are deprecated under the
//! primary's symbol.

use std::collections::BTreeMap;
use std::sync::Arc;
use trendreg::config::RegistryConfig;
use trendreg::domain::{
    MergeProposal, RiskLevel, SymbolRequest, SymbolStatus, Topic, VerificationLevel,
};
use trendreg::jobs::{InProcessQueue, JobQueue};
use trendreg::registry::{RuleTableValidator, SymbolRegistry};
use trendreg::store::{MemoryStore, SymbolStore, TopicStore};
use trendreg::workflow::{MergeWorker, MergeWorkflow};
use uuid::Uuid;

fn request(topic_id: Uuid, category: &str) -> SymbolRequest {
    SymbolRequest {
        topic_id,
        region: "ZA".to_string(),
        category: category.to_string(),
        alias: None,
        created_by: "admin".to_string(),
        required_verification: VerificationLevel::None,
        risk_level: RiskLevel::Low,
        metadata: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn completed_topic_merge_deprecates_losing_symbols() {
    let store = MemoryStore::new();
    let (queue, mut receiver) = InProcessQueue::new();
    let queue: Arc<dyn JobQueue> = Arc::new(queue);
    let registry = Arc::new(SymbolRegistry::new(
        Arc::new(store.clone()),
        Arc::new(RuleTableValidator::default()),
        RegistryConfig::default(),
    ));
    let workflow = MergeWorkflow::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        queue,
    );
    let worker = MergeWorker::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        registry.clone(),
        2,
    );

    let primary = Topic::new("Big Brother Mzansi S6", "bbmzansi-s6", "ENT", "ZA");
    let duplicate = Topic::new("BBMzansi Season 6", "bbmzansi-season-6", "ENT", "ZA");
    store.create_topic(&primary).await.unwrap();
    store.create_topic(&duplicate).await.unwrap();

    let winner = registry
        .register_symbol(&request(primary.id, "ENT"))
        .await
        .unwrap();
    let loser = registry
        .register_symbol(&request(duplicate.id, "ENT"))
        .await
        .unwrap();

    let proposal = MergeProposal {
        primary_id: primary.id,
        duplicate_ids: vec![duplicate.id],
        scores: BTreeMap::from([(duplicate.id, 0.92)]),
        confidence: 0.92,
        reason: "integration test".to_string(),
    };
    workflow.execute(&proposal, "admin").await.unwrap();
    while let Ok(job) = receiver.try_recv() {
        worker.handle(job).await;
    }

    let winner_after = store.get_symbol(&winner.symbol).await.unwrap().unwrap();
    assert_eq!(
        winner_after.lifecycle.child_symbols,
        vec![loser.symbol.clone()]
    );

    let loser_after = store.get_symbol(&loser.symbol).await.unwrap().unwrap();
    assert_eq!(loser_after.status, SymbolStatus::Deprecated);
    assert_eq!(
        loser_after.lifecycle.parent_symbol.as_deref(),
        Some(winner.symbol.as_str())
    );
    assert_eq!(
        loser_after.audit_log.last().unwrap().action,
        "conflict_merge"
    );
}

#[tokio::test]
async fn symbol_string_matches_fixed_grammar() {
    let store = MemoryStore::new();
    let registry = SymbolRegistry::new(
        Arc::new(store.clone()),
        Arc::new(RuleTableValidator::default()),
        RegistryConfig::default(),
    );

    let registration = registry
        .register_symbol(&request(Uuid::new_v4(), "ENT"))
        .await
        .unwrap();

    let parts: Vec<&str> = registration.symbol.split(':').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "V");
    assert_eq!(parts[1], "ZA");
    assert_eq!(parts[2], "ENT");
    assert_eq!(parts[3].len(), 8);
}
