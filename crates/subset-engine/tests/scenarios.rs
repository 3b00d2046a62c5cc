//! Multi-step flows: the countries walkthrough, trim signature policies and
//! commit races.

use chrono::Utc;
use pretty_assertions::assert_eq;
use subset_engine::{EngineConfig, EngineError, SignatureOnTrim, SubsetEvent};
use subset_model::{
    ProjectStatus, QuestionSubsetLink, SubsetDefinition, SubsetMembership, SubsetSignature, UserId,
};
use subset_store::UnitOfWork;
use subset_test_utils::Fixture;

#[tokio::test]
async fn test_countries_walkthrough() {
    let fx = Fixture::new();
    let project = fx.seed_project("Brand Tracker", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let q3 = fx.seed_line(&project, "Q3").await;
    let (countries, items) = fx.seed_list(&project, "Countries", &["US", "UK", "FR"]).await;
    let (us, uk, fr) = (&items[0], &items[1], &items[2]);
    for line in [&q1, &q2, &q3] {
        fx.assign(line, &countries).await.unwrap();
    }

    let full = fx.save(&project, &q1, &countries, &[us, uk, fr]).await.unwrap();
    assert!(full.is_full_selection);
    assert_eq!(full.subset_definition_id, None);

    let created = fx.save(&project, &q2, &countries, &[us, uk]).await.unwrap();
    assert_eq!(created.subset_name.as_deref(), Some("Countries_SUB1"));

    let reused = fx.save(&project, &q3, &countries, &[uk, us]).await.unwrap();
    assert_eq!(reused.subset_definition_id, created.subset_definition_id);
    assert_eq!(fx.store.snapshot().subset_count(), 1);

    fx.create_item(&countries, "DE", 4).await.1.unwrap();
    assert_eq!(fx.selection_codes(&q1, &countries).await, vec!["US", "UK", "FR", "DE"]);
    assert_eq!(fx.selection_codes(&q2, &countries).await, vec!["US", "UK"]);
    assert_eq!(fx.selection_codes(&q3, &countries).await, vec!["US", "UK"]);

    fx.deactivate_item(us.id).await.unwrap();
    let subset = fx
        .management
        .get_subset_details(created.subset_definition_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    let members: Vec<&str> = subset.members.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(members, vec!["UK"]);
    assert_eq!(fx.selection_codes(&q1, &countries).await, vec!["UK", "FR", "DE"]);
    assert_eq!(fx.selection_codes(&q2, &countries).await, vec!["UK"]);
}

#[tokio::test]
async fn test_pinned_signature_does_not_match_trimmed_members() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    let first = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    fx.deactivate_item(items[1].id).await.unwrap();

    let second = fx.save(&project, &q2, &list, &[&items[0]]).await.unwrap();

    assert_ne!(second.subset_definition_id, first.subset_definition_id);
    assert_eq!(second.subset_name.as_deref(), Some("Markets_SUB2"));
}

#[tokio::test]
async fn test_reusing_trimmed_subset_restores_its_members() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    let (x, y) = (&items[0], &items[1]);
    let first = fx.save(&project, &q1, &list, &[x, y]).await.unwrap();
    let subset_id = first.subset_definition_id.unwrap();
    fx.deactivate_item(y.id).await.unwrap();
    fx.reactivate_item(y.id).await.unwrap();
    assert_eq!(fx.selection_codes(&q1, &list).await, vec!["X"]);
    fx.events.clear();
    fx.hooks.clear();

    let second = fx.save(&project, &q2, &list, &[x, y]).await.unwrap();

    assert_eq!(second.subset_definition_id, Some(subset_id));
    assert_eq!(fx.store.snapshot().subset_count(), 1);
    assert_eq!(fx.selection_codes(&q2, &list).await, vec!["X", "Y"]);
    assert_eq!(fx.selection_codes(&q1, &list).await, vec!["X", "Y"]);
    assert!(fx.events.events().contains(&SubsetEvent::MembershipsRestored {
        subset_definition_id: subset_id,
        managed_list_item_ids: vec![y.id],
    }));
    assert_eq!(fx.hooks.display_refreshes(), vec![subset_id]);
    assert_eq!(fx.store.snapshot().memberships_for_subset(subset_id).len(), 2);
}

#[tokio::test]
async fn test_reusing_intact_subset_leaves_members_alone() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    fx.events.clear();

    fx.save(&project, &q2, &list, &[&items[1], &items[0]]).await.unwrap();

    assert!(!fx.events.kinds().contains(&"memberships_restored"));
    assert!(fx.hooks.display_refreshes().is_empty());
}

#[tokio::test]
async fn test_recompute_resigns_trimmed_subset() {
    let fx = Fixture::with_config(EngineConfig::new().with_signature_on_trim(SignatureOnTrim::Recompute));
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    let first = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    let subset_id = first.subset_definition_id.unwrap();

    fx.deactivate_item(items[1].id).await.unwrap();

    let details = fx.management.get_subset_details(subset_id).await.unwrap().unwrap();
    assert_eq!(details.signature_hash, SubsetSignature::build([items[0].id]).unwrap());
    assert!(fx.events.kinds().contains(&"signature_recomputed"));

    let second = fx.save(&project, &q2, &list, &[&items[0]]).await.unwrap();
    assert_eq!(second.subset_definition_id, Some(subset_id));
}

#[tokio::test]
async fn test_recompute_merges_into_existing_subset() {
    let fx = Fixture::with_config(EngineConfig::new().with_signature_on_trim(SignatureOnTrim::Recompute));
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    let wide = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    let narrow = fx.save(&project, &q2, &list, &[&items[0]]).await.unwrap();
    let (wide_id, narrow_id) = (
        wide.subset_definition_id.unwrap(),
        narrow.subset_definition_id.unwrap(),
    );

    fx.deactivate_item(items[1].id).await.unwrap();

    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.subset_count(), 1);
    assert!(snapshot.subset(wide_id).is_none());
    assert_eq!(
        snapshot.link(q1.id, list.id).unwrap().subset_definition_id,
        Some(narrow_id)
    );
    assert!(fx.events.events().contains(&SubsetEvent::SubsetsMerged {
        retired: wide_id,
        survivor: narrow_id,
        repointed_question_ids: vec![q1.id],
    }));
    assert_eq!(fx.hooks.display_refreshes(), vec![narrow_id]);
}

#[tokio::test]
async fn test_recompute_keeps_signature_when_no_members_remain() {
    let fx = Fixture::with_config(EngineConfig::new().with_signature_on_trim(SignatureOnTrim::Recompute));
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;
    let saved = fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();
    let subset_id = saved.subset_definition_id.unwrap();

    fx.deactivate_item(items[0].id).await.unwrap();

    let details = fx.management.get_subset_details(subset_id).await.unwrap().unwrap();
    assert!(details.members.is_empty());
    assert_eq!(details.signature_hash, SubsetSignature::build([items[0].id]).unwrap());
    assert!(fx.selection(&line, &list).await.items.is_empty());
}

#[tokio::test]
async fn test_lost_signature_race_retries_into_reuse() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    // A concurrent writer materializes the same selection first
    let signature = SubsetSignature::build([items[0].id, items[1].id]).unwrap();
    let competitor = SubsetDefinition::new(
        project.id,
        list.id,
        "Markets_SUB1",
        signature,
        UserId::new(),
        Utc::now(),
    );
    let competitor_id = competitor.id;
    let members = [items[0].id, items[1].id];
    let (project_id, list_id) = (project.id, list.id);
    fx.store.interleave_before_next_commit(move |tx| {
        tx.insert_subset(competitor).unwrap();
        for item in members {
            tx.insert_membership(SubsetMembership::new(competitor_id, item)).unwrap();
        }
        tx.raise_name_high_water(project_id, list_id, 1).unwrap();
    });

    let saved = fx.save(&project, &line, &list, &[&items[0], &items[1]]).await.unwrap();

    assert_eq!(saved.subset_definition_id, Some(competitor_id));
    assert_eq!(saved.subset_name.as_deref(), Some("Markets_SUB1"));
    assert_eq!(fx.store.commit_attempts(), 2);
    assert_eq!(fx.store.snapshot().subset_count(), 1);
    assert_eq!(fx.store.snapshot().membership_count(), 2);
    assert!(fx.events.kinds().contains(&"conflict_retried"));
}

#[tokio::test]
async fn test_lost_link_race_retries_into_update() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;

    let link = QuestionSubsetLink::new(project.id, line.id, list.id, None, UserId::new(), Utc::now());
    let link_id = link.id;
    fx.store
        .interleave_before_next_commit(move |tx| tx.insert_link(link).unwrap());

    let saved = fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();

    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.link_count(), 1);
    let stored = snapshot.link(line.id, list.id).unwrap();
    assert_eq!(stored.id, link_id);
    assert_eq!(stored.subset_definition_id, saved.subset_definition_id);
}

#[tokio::test]
async fn test_conflict_surfaces_when_retries_are_exhausted() {
    let fx = Fixture::with_config(EngineConfig::new().with_conflict_retries(0));
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;

    let link = QuestionSubsetLink::new(project.id, line.id, list.id, None, UserId::new(), Utc::now());
    fx.store
        .interleave_before_next_commit(move |tx| tx.insert_link(link).unwrap());

    let err = fx.save(&project, &line, &list, &[&items[0]]).await.unwrap_err();

    assert!(matches!(err, EngineError::Conflict(_)));
    // Only the competing writer's rows are visible
    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.subset_count(), 0);
    assert!(snapshot.link(line.id, list.id).unwrap().is_full_selection());
}
