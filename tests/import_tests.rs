use quiz_corpus::database::{Database, QuestionFilter};
use quiz_corpus::models::ImportRow;
use quiz_corpus::ImportService;

fn row(pairs: &[(&str, &str)]) -> ImportRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn full_row(question: &str) -> ImportRow {
    row(&[
        ("Question", question),
        ("Thème", "Institutions"),
        ("Niveau", "Facile"),
        ("Réponse A", "Le Président"),
        ("Réponse B", "Le Parlement"),
        ("Réponse C", "Le Sénat"),
        ("Réponse D", "Le Conseil constitutionnel"),
        ("Bonne réponse", "B"),
    ])
}

async fn test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn test_counters_sum_to_total_rows() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let rows = vec![
        full_row("Qui vote les lois en France ?"),
        // In-batch duplicate of the first row.
        full_row("Qui vote les lois en France ?"),
        // No question text at all.
        row(&[("Thème", "histoire")]),
        // Only one usable choice.
        row(&[
            ("Question", "Question avec un seul choix ?"),
            ("Réponse A", "Oui"),
        ]),
    ];

    let result = service.import_rows(rows).await.unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.empty, 1);
    assert_eq!(result.bad_data, 1);
    assert_eq!(result.total_rows, 4);
    assert_eq!(
        result.imported + result.duplicates + result.empty + result.bad_data,
        result.total_rows
    );
    assert_eq!(
        result.skipped_duplicates,
        vec!["Qui vote les lois en France ?".to_string()]
    );
}

#[tokio::test]
async fn test_french_row_maps_to_canonical_record() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let result = service
        .import_rows(vec![full_row("Qui nomme le Premier ministre ?")])
        .await
        .unwrap();
    assert_eq!(result.imported, 1);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record.question, "Qui nomme le Premier ministre ?");
    assert_eq!(record.theme, "institutions");
    assert_eq!(record.level, "facile");
    assert_eq!(record.exam_type, "naturalisation");
    assert_eq!(record.choices.len(), 4);
    assert_eq!(record.correct_index, 1);
    assert!(record.is_active);
    assert!(record.check_invariants().is_ok());
}

#[tokio::test]
async fn test_rerun_of_same_batch_imports_nothing() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let batch = vec![
        full_row("Quelle est la devise de la République ?"),
        full_row("Quand a eu lieu la Révolution française ?"),
    ];

    let first = service.import_rows(batch.clone()).await.unwrap();
    assert_eq!(first.imported, 2);

    let second = service.import_rows(batch).await.unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.duplicates, 2);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_variant_marker_rows_collide() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let rows = vec![
        full_row("Qui vote les lois ?"),
        full_row("Qui vote les lois ? (Variante 2)"),
        full_row("QUI VOTE LES LOIS"),
    ];

    let result = service.import_rows(rows).await.unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.duplicates, 2);
}

#[tokio::test]
async fn test_missing_answer_column_defaults_to_first_choice() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let result = service
        .import_rows(vec![row(&[
            ("Question", "Question sans colonne de réponse ?"),
            ("Réponse A", "Premier"),
            ("Réponse B", "Second"),
        ])])
        .await
        .unwrap();
    assert_eq!(result.imported, 1);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert_eq!(stored[0].correct_index, 0);
}

#[tokio::test]
async fn test_answer_letter_pointing_at_empty_slot_is_bad_data() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    // "C" is a recognized letter but the C column is blank.
    let result = service
        .import_rows(vec![row(&[
            ("Question", "Question mal étiquetée ?"),
            ("Réponse A", "Oui"),
            ("Réponse B", "Non"),
            ("Réponse C", ""),
            ("Bonne réponse", "C"),
        ])])
        .await
        .unwrap();
    assert_eq!(result.imported, 0);
    assert_eq!(result.bad_data, 1);
}

#[tokio::test]
async fn test_repeated_choice_text_is_bad_data() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    // Two columns carrying the same answer text, modulo surrounding spaces.
    let result = service
        .import_rows(vec![row(&[
            ("Question", "Question aux choix répétés ?"),
            ("Réponse A", "Oui"),
            ("Réponse B", "Oui "),
            ("Réponse C", "Non"),
            ("Bonne réponse", "A"),
        ])])
        .await
        .unwrap();
    assert_eq!(result.imported, 0);
    assert_eq!(result.bad_data, 1);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_imported_records_satisfy_invariants() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let rows = vec![
        full_row("Qui préside le Conseil des ministres ?"),
        row(&[
            ("Question", "Question aux choix identiques ?"),
            ("Réponse A", "Pareil"),
            ("Réponse B", "Pareil"),
        ]),
    ];
    let result = service.import_rows(rows).await.unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.bad_data, 1);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert!(stored.iter().all(|q| q.check_invariants().is_ok()));
}

#[tokio::test]
async fn test_answer_remaps_around_empty_choice_slot() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    // B is blank, so C lands at index 1 in the stored choice list.
    let result = service
        .import_rows(vec![row(&[
            ("Question", "Où siège le Sénat ?"),
            ("Réponse A", "Palais Bourbon"),
            ("Réponse B", "  "),
            ("Réponse C", "Palais du Luxembourg"),
            ("Bonne réponse", "C"),
        ])])
        .await
        .unwrap();
    assert_eq!(result.imported, 1);

    let stored = db
        .query_questions(&QuestionFilter::default())
        .await
        .unwrap();
    assert_eq!(stored[0].choices.len(), 2);
    assert_eq!(stored[0].correct_index, 1);
    assert_eq!(stored[0].choices[1], "Palais du Luxembourg");
}

#[tokio::test]
async fn test_csv_import_round_trip() {
    let db = test_db().await;
    let service = ImportService::new(db.clone());

    let csv = "\
Question,Thème,Niveau,Réponse A,Réponse B,Bonne réponse
Qui élit le Président de la République ?,institutions,moyen,Le Parlement,Les citoyens,B
Qui élit le Président de la République ?,institutions,moyen,Le Parlement,Les citoyens,B
,histoire,facile,,,
";

    let result = service.import_csv(csv).await.unwrap();
    assert_eq!(result.total_rows, 3);
    assert_eq!(result.imported, 1);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.empty, 1);
}

#[tokio::test]
async fn test_small_batch_limit_still_imports_everything() {
    let db = test_db().await;
    let service = ImportService::with_batch_limit(db.clone(), 2);

    let rows: Vec<ImportRow> = (0..7)
        .map(|i| full_row(&format!("Question numéro {} ?", i)))
        .collect();

    let result = service.import_rows(rows).await.unwrap();
    assert_eq!(result.imported, 7);

    let count = db.count_questions(None).await.unwrap();
    assert_eq!(count, 7);
}
