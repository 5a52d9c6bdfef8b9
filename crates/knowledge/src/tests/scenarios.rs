use super::{context, meta, mock_config, mock_services, services_with};
use crate::access::access_filter;
use crate::agents::{AgentManager, AgentUpdate, NewAgent};
use crate::filter::Filter;
use crate::generator::{GenerationRequest, Generator};
use crate::retriever::Retriever;
use crate::types::{Metadata, ASSOCIATED_AGENTS};
use crate::vectordb::{LocalVectorDb, MemoryVectorDb, TenancyMode, VectorDatabase};
use crate::service::ServiceContext;
use pulse_core::TenantOverrides;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_visibility_across_users_and_organizations() {
    let retriever = Retriever::new(mock_services());
    let alice = context("org1", "alice");
    let bob = context("org1", "bob");
    let carol = context("org2", "carol");
    let query = "quarterly revenue report";

    retriever
        .store_document(&alice, "Quarterly revenue report for Q3", meta(json!({"visibility": "private"})))
        .await
        .unwrap();

    assert_eq!(retriever.retrieve(&alice, query, None, 5, true).await.unwrap().len(), 1);
    assert!(retriever.retrieve(&bob, query, None, 5, true).await.unwrap().is_empty());

    retriever
        .store_document(&alice, "Quarterly revenue report for Q4", meta(json!({"visibility": "shared"})))
        .await
        .unwrap();

    let bob_hits = retriever.retrieve(&bob, query, None, 5, true).await.unwrap();
    assert_eq!(bob_hits.len(), 1);
    assert_eq!(bob_hits[0].text, "Quarterly revenue report for Q4");
    assert!(retriever.retrieve(&carol, query, None, 5, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_caller_filters_cannot_escape_organization() {
    let retriever = Retriever::new(mock_services());
    let alice = context("org1", "alice");
    let eve = context("org2", "eve");

    retriever
        .store_document(&eve, "secret plans", meta(json!({"visibility": "public"})))
        .await
        .unwrap();

    let escapes = [
        Filter::eq("organization_id", "org2"),
        Filter::Or(vec![
            Filter::eq("organization_id", "org2"),
            Filter::eq("visibility", "public"),
        ]),
        Filter::all([Filter::eq("user_id", "eve"), Filter::eq("visibility", "public")]),
    ];
    for escape in &escapes {
        let hits = retriever
            .retrieve(&alice, "secret plans", Some(escape), 5, false)
            .await
            .unwrap();
        assert!(hits.is_empty(), "filter {} leaked", escape.to_json());

        let security = access_filter("org1", "alice", None, Some(escape));
        let mut foreign = Metadata::new();
        foreign.insert("organization_id".into(), json!("org2"));
        foreign.insert("user_id".into(), json!("eve"));
        foreign.insert("visibility".into(), json!("public"));
        assert!(!security.matches(&foreign));
    }
}

#[tokio::test]
async fn test_shared_collection_refuses_foreign_ids() {
    let db = MemoryVectorDb::new(TenancyMode::SharedCollection, "kb");
    let ids = db
        .add("org1", &["mine".to_string()], &[vec![1.0, 0.0]], vec![meta(json!({"k": "v"}))])
        .await
        .unwrap();

    assert!(db.get("org2", &ids[0]).await.unwrap().is_none());
    assert!(!db.update("org2", &ids[0], Some("hijacked".into()), None, None).await.unwrap());
    assert!(!db.delete("org2", &ids).await.unwrap());

    let doc = db.get("org1", &ids[0]).await.unwrap().unwrap();
    assert_eq!(doc.text, "mine");
    assert_eq!(doc.embedding, Some(vec![1.0, 0.0]));
    assert_eq!(doc.metadata["k"], "v");
    assert_eq!(doc.metadata["organization_id"], "org1");
}

#[tokio::test]
async fn test_rerank_truncates_to_limit() {
    let retriever = Retriever::new(mock_services());
    let alice = context("org1", "alice");

    let docs = (0..12)
        .map(|i| {
            crate::types::NewDocument::new(format!(
                "Deployment guide part {} covering {}",
                i,
                "rollout ".repeat(i + 1)
            ))
        })
        .collect();
    retriever.store_documents(&alice, docs).await.unwrap();

    let hits = retriever
        .retrieve(&alice, "deployment guide rollout", None, 5, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn test_ungrounded_answer() {
    let generator = Generator::new(mock_services());
    let answer = generator
        .generate_answer(&context("org1", "alice"), &GenerationRequest::new("Who won in 1998?"))
        .await
        .unwrap();

    assert!(!answer.answer.is_empty());
    assert!(answer.documents.is_empty());
}

#[tokio::test]
async fn test_agent_association_replacement_and_deletion() {
    let services = mock_services();
    let retriever = Retriever::new(services.clone());
    let manager = AgentManager::new(services.clone());
    let alice = context("org1", "alice");

    let mut ids = Vec::new();
    for text in ["d1 text", "d2 text", "d3 text"] {
        ids.push(retriever.store_document(&alice, text, Metadata::new()).await.unwrap());
    }
    let (d1, d2, d3) = (&ids[0], &ids[1], &ids[2]);

    let agent = manager
        .create(&alice, NewAgent::new("Helper", "Help").with_documents(vec![d1.clone(), d2.clone()]))
        .await
        .unwrap();
    assert_eq!(agent.document_count, 2);

    let update = AgentUpdate {
        document_ids: Some(vec![d2.clone(), d3.clone()]),
        ..Default::default()
    };
    let updated = manager.update(&alice, &agent.id, update).await.unwrap().unwrap();
    assert_eq!(updated.document_count, 2);

    let agents_of = |id: &str| {
        let retriever = retriever.clone();
        let alice = alice.clone();
        let id = id.to_string();
        async move {
            retriever
                .get_document(&alice, &id)
                .await
                .unwrap()
                .unwrap()
                .metadata
                .get(ASSOCIATED_AGENTS)
                .cloned()
        }
    };
    assert_eq!(agents_of(d1.as_str()).await, None);
    assert_eq!(agents_of(d2.as_str()).await, Some(json!([agent.id])));
    assert_eq!(agents_of(d3.as_str()).await, Some(json!([agent.id])));

    assert!(manager.delete(&alice, &agent.id).await.unwrap());
    for id in &ids {
        assert_eq!(agents_of(id.as_str()).await, None);
    }
    assert!(manager.get(&alice, &agent.id).await.unwrap().is_none());
    assert_eq!(retriever.list_documents(&alice, None, 10, 0).await.unwrap().1, 3);
}

#[tokio::test]
async fn test_agent_update_invalidates_cache() {
    let services = mock_services();
    let manager = AgentManager::new(services.clone());
    let alice = context("org1", "alice");
    let agent = manager.create(&alice, NewAgent::new("Old name", "Help")).await.unwrap();
    let messages = [pulse_llm::ChatMessage::user("hello there")];
    let options = pulse_llm::GenerationOptions::default();

    let reply = manager.chat(&alice, &agent.id, &messages, &options).await.unwrap().unwrap();
    assert!(reply.contains("You are Old name."));

    let update = AgentUpdate {
        name: Some("New name".to_string()),
        ..Default::default()
    };
    manager.update(&alice, &agent.id, update).await.unwrap().unwrap();
    assert!(services.agent_cache().keys().is_empty());

    // Another user of the organization chats with the same cached agent
    let bob = context("org1", "bob");
    let reply = manager.chat(&bob, &agent.id, &messages, &options).await.unwrap().unwrap();
    assert!(reply.contains("You are New name."));
}

#[tokio::test]
async fn test_registry_resolution_is_stable_until_cleared() {
    let services = mock_services();
    let first = services.vector_db("org1").unwrap();
    assert!(Arc::ptr_eq(&first, &services.vector_db("org1").unwrap()));

    services.clear_caches();
    assert!(!Arc::ptr_eq(&first, &services.vector_db("org1").unwrap()));
}

#[tokio::test]
async fn test_per_tenant_backend_keeps_collections_apart() {
    let services = mock_services();
    for org in ["org1", "org2"] {
        services.update_tenant(
            org,
            TenantOverrides {
                shared_vector_db: Some(false),
                ..Default::default()
            },
        );
    }
    let retriever = Retriever::new(services.clone());

    retriever
        .store_document(&context("org1", "alice"), "alpha notes", Metadata::new())
        .await
        .unwrap();
    retriever
        .store_document(&context("org2", "alice"), "beta notes", Metadata::new())
        .await
        .unwrap();

    let db = services.vector_db("org1").unwrap();
    assert_eq!(db.collection_name("org1"), "hello_pulse_org1");
    assert_eq!(db.count("org1", None).await.unwrap(), 1);

    let hits = retriever
        .retrieve(&context("org2", "alice"), "notes", None, 5, false)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "beta notes");
}

#[tokio::test]
async fn test_listing_follows_visibility() {
    let retriever = Retriever::new(mock_services());
    let alice = context("org1", "alice");
    let bob = context("org1", "bob");

    let private = retriever
        .store_document(&alice, "alice private plans", Metadata::new())
        .await
        .unwrap();
    let shared = retriever
        .store_document(&alice, "alice shared plans", meta(json!({"visibility": "shared"})))
        .await
        .unwrap();
    let own = retriever
        .store_document(&bob, "bob private plans", Metadata::new())
        .await
        .unwrap();

    let (docs, total) = retriever.list_documents(&bob, None, 10, 0).await.unwrap();
    let mut ids: Vec<&str> = docs.iter().map(|doc| doc.id.as_str()).collect();
    ids.sort_unstable();
    let mut expected = vec![shared.as_str(), own.as_str()];
    expected.sort_unstable();
    assert_eq!(ids, expected);
    assert_eq!(total, 2);

    // Filtering on the owner or the visibility cannot widen the listing
    let escape = Filter::parse(r#"{"$or": [{"user_id": "alice"}, {"visibility": "private"}]}"#).unwrap();
    let (docs, _) = retriever.list_documents(&bob, Some(&escape), 10, 0).await.unwrap();
    assert!(docs.iter().all(|doc| doc.id != private));
}

#[tokio::test]
async fn test_agent_records_stay_out_of_answers() {
    let services = mock_services();
    let retriever = Retriever::new(services.clone());
    let alice = context("org1", "alice");
    let agent = AgentManager::new(services.clone())
        .create(&alice, NewAgent::new("Support bot", "Answer support questions"))
        .await
        .unwrap();

    let hits = retriever
        .retrieve(&alice, "Support bot answer support questions", None, 10, true)
        .await
        .unwrap();
    assert!(hits.is_empty());

    let answer = Generator::new(services.clone())
        .generate_answer(&alice, &GenerationRequest::new("What does the support bot do?"))
        .await
        .unwrap();
    assert!(answer.documents.is_empty());
    assert!(!answer.answer.contains(&agent.id));

    retriever
        .store_document(&alice, "Support hours are nine to five", Metadata::new())
        .await
        .unwrap();
    let hits = retriever
        .retrieve(&alice, "support", None, 10, false)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Support hours are nine to five");
}

fn local_services(data_dir: &Path) -> ServiceContext {
    let mut config = mock_config();
    config.defaults.vector_db = "local".to_string();
    config.defaults.shared_vector_db = false;
    config.vector_store.data_dir = data_dir.to_path_buf();
    services_with(config)
}

#[tokio::test]
async fn test_local_per_tenant_orgs_survive_restart_apart() {
    let temp_dir = TempDir::new().unwrap();
    let orgs = ["acme_x", "acme x", "globex"];
    {
        let retriever = Retriever::new(local_services(temp_dir.path()));
        for org in orgs {
            retriever
                .store_document(&context(org, "alice"), &format!("{} handbook", org), Metadata::new())
                .await
                .unwrap();
        }
    }

    let retriever = Retriever::new(local_services(temp_dir.path()));
    for org in orgs {
        let (docs, total) = retriever
            .list_documents(&context(org, "alice"), None, 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 1, "organization {:?}", org);
        assert_eq!(docs[0].text, format!("{} handbook", org));
        assert_eq!(docs[0].metadata["organization_id"], org);
    }
}

#[tokio::test]
async fn test_get_returns_stored_embedding() {
    let temp_dir = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn VectorDatabase>> = vec![
        Arc::new(MemoryVectorDb::new(TenancyMode::SharedCollection, "kb")),
        Arc::new(LocalVectorDb::new(TenancyMode::PerTenant, "kb", temp_dir.path())),
    ];
    let embedding = vec![0.25, -0.5, 1.0];

    for db in backends {
        let id = db
            .add("org1", &["vector text".to_string()], &[embedding.clone()], vec![Metadata::new()])
            .await
            .unwrap()
            .remove(0);

        let doc = db.get("org1", &id).await.unwrap().unwrap();
        assert_eq!(doc.embedding, Some(embedding.clone()), "backend {}", db.provider_name());
        assert_eq!(doc.text, "vector text");
        assert!(db.get("org2", &id).await.unwrap().is_none());
    }
}
