use std::fs;

use tempfile::tempdir;

use annotation_prep::transport::tsv::read_table;
use annotation_prep::{
    DelimitedIndexBuilder, FieldValue, KeywordAnnotator, MemorySink, PrepError, RecordLoader,
    RecordMerger,
};

#[test]
fn duplicate_identifiers_keep_first_occurrence() {
    let temp = tempdir().unwrap();
    let meta = temp.path().join("meta.tsv");
    fs::write(
        &meta,
        "pmid\tyear\ttitle\n7\t2001\tFirst\n8\t2002\tOther\n7\t1999\tSecond\n",
    )
    .unwrap();
    let conclusions = temp.path().join("conclusions.tsv");
    fs::write(
        &conclusions,
        "pmid\tconclusions\n5\tkept\n5\tdropped\n6\t\n6\tfilled later\n",
    )
    .unwrap();

    let sink = MemorySink::new();
    let loader = RecordLoader::new("pmid").with_sink(&sink);

    let records = loader.load_metadata(&meta).unwrap();
    let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["7", "8"]);
    assert_eq!(
        records.get("7").unwrap().field("year"),
        Some(&FieldValue::Integer(2001))
    );
    assert!(sink.contains("* dropped 1 duplicated pmid values"));

    let texts = loader.load_text_source(&conclusions).unwrap();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts.get("5").unwrap().text("conclusions").as_deref(), Some("kept"));
    assert_eq!(
        texts.get("6").unwrap().text("conclusions").as_deref(),
        Some("filled later")
    );
    assert!(sink.contains("* loaded 2/2 records with conclusions from"));
}

#[test]
fn metadata_without_required_columns_is_a_schema_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("meta.tsv");
    fs::write(&path, "journal\tabstract\nJ1\ttext\n").unwrap();
    let sink = MemorySink::new();
    let err = RecordLoader::new("pmid")
        .with_sink(&sink)
        .load_metadata(&path)
        .unwrap_err();
    assert!(matches!(err, PrepError::Schema { .. }));
}

#[test]
fn merge_fills_gaps_only_from_fully_populated_rows() {
    let temp = tempdir().unwrap();
    let a = temp.path().join("a.tsv");
    let b = temp.path().join("b.tsv");
    fs::write(&a, "pmid\ttitle\tyear\n1\tT\t2000\n").unwrap();
    fs::write(&b, "pmid\ttitle\tyear\n1\t\t2000\n2\tU\t2001\n").unwrap();

    let sink = MemorySink::new();
    let loader = RecordLoader::new("pmid").with_sink(&sink);
    let merged = RecordMerger::new()
        .with_sink(&sink)
        .combine_files(&loader, &a, &b)
        .unwrap();

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get("1").unwrap().text("title").as_deref(), Some("T"));
    assert_eq!(merged.get("2").unwrap().text("title").as_deref(), Some("U"));
    assert_eq!(
        merged.get("2").unwrap().field("year"),
        Some(&FieldValue::Integer(2001))
    );
}

#[test]
fn annotation_and_index_from_files() {
    let temp = tempdir().unwrap();
    let mapping = temp.path().join("journal_bsts.tsv");
    fs::write(
        &mapping,
        "JournalTitle\tBroadSubjectTerms\nJ1\tA; B\nJ2\t\nJ3\tA\n",
    )
    .unwrap();

    let sink = MemorySink::new();
    let build = DelimitedIndexBuilder::default()
        .with_sink(&sink)
        .build(&read_table(&mapping).unwrap())
        .unwrap();
    assert_eq!(build.index.values("A").unwrap(), ["J1", "J3"]);
    assert_eq!(build.index.values("B").unwrap(), ["J1"]);
    assert_eq!(build.skipped_rows, 1);
    assert!(sink.contains("* extracted 2 keys for 3 values!"));

    let annotator = KeywordAnnotator::default();
    let flags = annotator.annotate_with(&["NOVEL finding", "policy renewal", "replicated"], |text| {
        Some(std::borrow::Cow::Borrowed(*text))
    });
    assert_eq!(flags, vec![true, true, false]);
}
