//! Saving selections, subset queries and deletion.

use pretty_assertions::assert_eq;
use subset_engine::{EngineError, SaveSelectionRequest, SubsetEvent};
use subset_model::{ManagedListItemId, ProjectId, ProjectStatus, QuestionnaireLineId};
use subset_test_utils::Fixture;

#[tokio::test]
async fn test_selecting_every_active_item_is_full_selection() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    let saved = fx
        .save(&project, &line, &list, &[&items[2], &items[0], &items[1]])
        .await
        .unwrap();

    assert!(saved.is_full_selection);
    assert_eq!(saved.subset_definition_id, None);
    assert_eq!(saved.subset_name, None);
    assert_eq!(fx.store.snapshot().subset_count(), 0);
    assert!(fx.store.snapshot().link(line.id, list.id).unwrap().is_full_selection());
    assert!(fx.events.kinds().contains(&"full_selection_applied"));
}

#[tokio::test]
async fn test_partial_selection_creates_named_subset() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    let saved = fx.save(&project, &line, &list, &[&items[0], &items[1]]).await.unwrap();

    assert!(!saved.is_full_selection);
    assert_eq!(saved.subset_name.as_deref(), Some("Markets_SUB1"));
    let details = fx
        .management
        .get_subset_details(saved.subset_definition_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    let codes: Vec<&str> = details.members.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["X", "Y"]);
    assert_eq!(details.managed_list_name, "Markets");
    assert_eq!(details.created_by, fx.user);
}

#[tokio::test]
async fn test_identical_selections_share_one_subset() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    let first = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    let second = fx
        .save(&project, &q2, &list, &[&items[1], &items[0], &items[1]])
        .await
        .unwrap();

    assert_eq!(first.subset_definition_id, second.subset_definition_id);
    assert_eq!(fx.store.snapshot().subset_count(), 1);
    assert_eq!(fx.store.snapshot().membership_count(), 2);
    assert!(fx.events.kinds().contains(&"subset_reused"));
}

#[tokio::test]
async fn test_distinct_selections_are_numbered_sequentially() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    let first = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    let second = fx.save(&project, &q2, &list, &[&items[0]]).await.unwrap();

    assert_eq!(first.subset_name.as_deref(), Some("Markets_SUB1"));
    assert_eq!(second.subset_name.as_deref(), Some("Markets_SUB2"));
}

#[tokio::test]
async fn test_names_are_not_reused_after_delete() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();
    let second = fx.save(&project, &line, &list, &[&items[1]]).await.unwrap();
    fx.management
        .delete_subset(second.subset_definition_id.unwrap(), fx.user)
        .await
        .unwrap();

    let third = fx.save(&project, &line, &list, &[&items[2]]).await.unwrap();
    assert_eq!(third.subset_name.as_deref(), Some("Markets_SUB3"));
}

#[tokio::test]
async fn test_resaving_repoints_existing_link() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;

    fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();
    fx.save(&project, &line, &list, &[&items[0], &items[1], &items[2]])
        .await
        .unwrap();

    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.link_count(), 1);
    let link = snapshot.link(line.id, list.id).unwrap();
    assert!(link.is_full_selection());
    assert_eq!(link.modified_by, Some(fx.user));
    // The earlier subset stays available for reuse
    assert_eq!(snapshot.subset_count(), 1);
}

#[tokio::test]
async fn test_inactive_items_do_not_count_towards_full_selection() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    fx.deactivate_item(items[2].id).await.unwrap();

    let active_only = fx.save(&project, &q1, &list, &[&items[0], &items[1]]).await.unwrap();
    assert!(active_only.is_full_selection);

    let with_inactive = fx
        .save(&project, &q2, &list, &[&items[0], &items[1], &items[2]])
        .await
        .unwrap();
    assert!(!with_inactive.is_full_selection);
}

#[tokio::test]
async fn test_empty_selection_is_rejected() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, _) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;
    let version = fx.store.version();

    let err = fx.save(&project, &line, &list, &[]).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert_eq!(fx.store.version(), version);
}

#[tokio::test]
async fn test_items_of_another_list_are_rejected() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (markets, markets_items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;
    let (_, brands_items) = fx.seed_list(&project, "Brands", &["A"]).await;
    let version = fx.store.version();

    let err = fx
        .save(&project, &line, &markets, &[&markets_items[0], &brands_items[0]])
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidArgument(ref m) if m.contains(&brands_items[0].id.to_string())));
    assert_eq!(fx.store.version(), version);
    assert_eq!(fx.store.snapshot().subset_count(), 0);
}

#[tokio::test]
async fn test_unknown_item_is_rejected() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, _) = fx.seed_list(&project, "Markets", &["X"]).await;

    let err = fx
        .management
        .save_question_selection(SaveSelectionRequest::new(
            project.id,
            line.id,
            list.id,
            [ManagedListItemId::new()],
            fx.user,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_missing_references_are_not_found() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X"]).await;

    let missing_project = SaveSelectionRequest::new(ProjectId::new(), line.id, list.id, [items[0].id], fx.user);
    let missing_line = SaveSelectionRequest::new(
        project.id,
        QuestionnaireLineId::new(),
        list.id,
        [items[0].id],
        fx.user,
    );

    for request in [missing_project, missing_line] {
        let err = fx.management.save_question_selection(request).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }), "got {err}");
    }
}

#[tokio::test]
async fn test_question_of_another_project_is_rejected() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let other = fx.seed_project("Other", ProjectStatus::Draft).await;
    let foreign_line = fx.seed_line(&other, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;

    let err = fx
        .save(&project, &foreign_line, &list, &[&items[0]])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_save_on_published_project_is_read_only() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;
    fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();
    fx.set_project_status(project.id, ProjectStatus::Active).await;
    let before = fx.store.snapshot();

    let err = fx.save(&project, &line, &list, &[&items[1]]).await.unwrap_err();

    assert!(err.is_read_only());
    let after = fx.store.snapshot();
    assert_eq!(after.subset_count(), before.subset_count());
    assert_eq!(after.link(line.id, list.id), before.link(line.id, list.id));
}

#[tokio::test]
async fn test_subsets_for_project_are_ordered_by_list_then_sequence() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (markets, m) = fx
        .seed_list(&project, "Markets", &["A", "B", "C", "D", "E"])
        .await;
    let (brands, b) = fx.seed_list(&project, "Brands", &["P", "Q"]).await;

    // Ten distinct partial selections of Markets: five singles, five pairs
    let picks: [&[usize]; 10] = [&[0], &[1], &[2], &[3], &[4], &[0, 1], &[0, 2], &[0, 3], &[0, 4], &[1, 2]];
    for pick in picks {
        let chosen: Vec<_> = pick.iter().map(|i| &m[*i]).collect();
        fx.save(&project, &line, &markets, &chosen).await.unwrap();
    }
    fx.save(&project, &line, &brands, &[&b[0]]).await.unwrap();

    let listing = fx
        .management
        .get_subsets_for_project(project.id)
        .await
        .unwrap()
        .unwrap();
    let names: Vec<&str> = listing.subsets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names.len(), 11);
    assert_eq!(names[0], "Brands_SUB1");
    assert_eq!(names[1], "Markets_SUB1");
    assert_eq!(names[2], "Markets_SUB2");
    assert_eq!(names[10], "Markets_SUB10");
    assert_eq!(listing.subsets[6].member_count, 2);
}

#[tokio::test]
async fn test_unknown_ids_read_as_none() {
    let fx = Fixture::new();

    assert_eq!(
        fx.management.get_subsets_for_project(ProjectId::new()).await.unwrap(),
        None
    );
    assert_eq!(
        fx.management
            .get_subset_details(subset_model::SubsetDefinitionId::new())
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_project_without_subsets_lists_empty() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;

    let listing = fx
        .management
        .get_subsets_for_project(project.id)
        .await
        .unwrap()
        .unwrap();
    assert!(listing.subsets.is_empty());
}

#[tokio::test]
async fn test_delete_reverts_questions_to_full_selection() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let q1 = fx.seed_line(&project, "Q1").await;
    let q2 = fx.seed_line(&project, "Q2").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y", "Z"]).await;
    let saved = fx.save(&project, &q1, &list, &[&items[0]]).await.unwrap();
    fx.save(&project, &q2, &list, &[&items[0]]).await.unwrap();
    let subset_id = saved.subset_definition_id.unwrap();

    let deleted = fx.management.delete_subset(subset_id, fx.user).await.unwrap();

    let mut expected = vec![q1.id, q2.id];
    expected.sort();
    assert_eq!(deleted.affected_question_ids, expected);
    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.subset_count(), 0);
    assert_eq!(snapshot.membership_count(), 0);
    assert!(snapshot.links().all(|l| l.is_full_selection()));
    assert_eq!(fx.selection_codes(&q1, &list).await, vec!["X", "Y", "Z"]);
    assert_eq!(fx.hooks.project_refreshes(), vec![project.id]);
    assert!(matches!(
        fx.events.events().last(),
        Some(SubsetEvent::SubsetDeleted { subset_definition_id, .. }) if *subset_definition_id == subset_id
    ));
}

#[tokio::test]
async fn test_delete_is_gated_on_draft() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, items) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;
    let saved = fx.save(&project, &line, &list, &[&items[0]]).await.unwrap();
    fx.set_project_status(project.id, ProjectStatus::Retired).await;

    let err = fx
        .management
        .delete_subset(saved.subset_definition_id.unwrap(), fx.user)
        .await
        .unwrap_err();

    assert!(err.is_read_only());
    assert_eq!(fx.store.snapshot().subset_count(), 1);
}

#[tokio::test]
async fn test_delete_unknown_subset_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .management
        .delete_subset(subset_model::SubsetDefinitionId::new(), fx.user)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_question_selection_without_link_is_full() {
    let fx = Fixture::new();
    let project = fx.seed_project("Study", ProjectStatus::Draft).await;
    let line = fx.seed_line(&project, "Q1").await;
    let (list, _) = fx.seed_list(&project, "Markets", &["X", "Y"]).await;

    let selection = fx.selection(&line, &list).await;
    assert!(selection.is_full_selection);
    assert_eq!(selection.codes(), vec!["X", "Y"]);

    let err = fx
        .management
        .get_question_selection(line.id, subset_model::ManagedListId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}
