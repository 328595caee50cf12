//! Integration tests driving the public `Converter` API end to end.
//!
//! Fixtures are generated in-process (lopdf for PDFs, image for rasters), so
//! these run without any files on disk beyond temporary directories.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream};
use retroconverter::{
    Category, ConversionConfig, ConversionStatus, ConvertError, Converter, FileStore,
    HistoryLedger, InputFile, LogLevel, Operation, PageRange, ValidationError,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pdf_with_pages(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let content = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
        });
        kids.push(Object::Reference(page));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([30, 144, 255, 200])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn converter() -> Converter {
    init_tracing();
    Converter::new(ConversionConfig::default())
}

fn result_bytes(converter: &Converter) -> Vec<u8> {
    converter.with_results(|r| r[0].bytes.clone())
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_conversion_while_running_is_busy() {
    init_tracing();
    let config = ConversionConfig::builder().pacing_ms(60).build().unwrap();
    let converter = Converter::new(config);
    converter.select_category(Category::Document);
    converter.select_files(vec![InputFile::new("a.md", b"# title".to_vec())]);

    let (first, second) = tokio::join!(converter.convert(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        converter.convert().await
    });

    assert_ok!(first);
    let err = assert_err!(second);
    assert!(matches!(err, ConvertError::Busy));
    assert_eq!(err.family(), "BusyError");
    // The running conversion was not disturbed by the rejected one.
    assert_eq!(converter.status(), ConversionStatus::Success);
    assert!(!converter.is_busy());
}

#[tokio::test]
async fn merge_with_a_single_file_is_a_validation_error() {
    let converter = converter();
    converter.select_category(Category::Pdf);
    assert_ok!(converter.select_operation(Operation::Merge));
    converter.select_files(vec![InputFile::new("only.pdf", pdf_with_pages(2))]);

    let err = assert_err!(converter.convert().await);
    assert!(matches!(
        err,
        ConvertError::Validation(ValidationError::InsufficientFiles { required: 2, found: 1, .. })
    ));
    assert!(matches!(converter.status(), ConversionStatus::Error { .. }));

    let log = converter.log_entries();
    assert_eq!(log.len(), 1, "validation failures log exactly one line");
    assert_eq!(log[0].level, LogLevel::Error);
    assert!(converter.history().load().is_empty());
}

#[tokio::test]
async fn empty_selection_is_no_file() {
    let converter = converter();
    let err = assert_err!(converter.convert().await);
    assert!(err.to_string().starts_with("no-file"), "{err}");
}

#[tokio::test]
async fn activity_log_stays_bounded() {
    let converter = converter();
    converter.select_category(Category::Document);
    converter.select_files(vec![InputFile::new("n.md", b"line".to_vec())]);
    for _ in 0..120 {
        assert_ok!(converter.convert().await);
        assert!(converter.log_entries().len() <= 80);
    }

    let tiny = Converter::new(ConversionConfig::builder().log_capacity(2).build().unwrap());
    tiny.select_category(Category::Audio);
    tiny.select_files(vec![InputFile::new("a.mp3", vec![0; 8])]);
    assert_ok!(tiny.convert().await);
    assert_eq!(tiny.log_entries().len(), 2);
}

#[tokio::test]
async fn history_keeps_the_newest_fifty() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = HistoryLedger::new(Arc::new(FileStore::new(dir.path())), "retro-history", 50);
    let converter = Converter::with_history(ConversionConfig::default(), ledger);
    converter.select_category(Category::Document);
    assert_ok!(converter.select_operation(Operation::from_extension("txt")));

    for n in 1..=51 {
        converter.select_files(vec![InputFile::new(format!("note{n}.md"), b"**x**".to_vec())]);
        assert_ok!(converter.convert().await);
    }

    let reopened = HistoryLedger::new(Arc::new(FileStore::new(dir.path())), "retro-history", 50);
    let records = reopened.load();
    assert_eq!(records.len(), 50);
    assert_eq!(records[0].inputs, "note51.md");
    assert_eq!(records[0].output, "note51.txt");
    assert!(records.iter().all(|r| r.inputs != "note1.md"), "oldest record evicted");
}

// ── Engines through the controller ───────────────────────────────────────────

#[tokio::test]
async fn audio_is_passed_through_with_a_warning() {
    let converter = converter();
    converter.select_category(Category::Audio);
    assert_ok!(converter.select_operation(Operation::from_extension("wav")));
    converter.select_files(vec![InputFile::new("track.ogg", b"OggS-payload".to_vec())]);

    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "track.wav");
    assert_eq!(out[0].mime, "audio/wav");
    assert_eq!(result_bytes(&converter), b"OggS-payload");
    assert!(converter
        .log_entries()
        .iter()
        .any(|e| e.level == LogLevel::Warning));
    assert_eq!(converter.status(), ConversionStatus::Success);
}

#[tokio::test]
async fn image_reencode_and_save() {
    let converter = converter();
    converter.select_category(Category::Image);
    assert_ok!(converter.select_operation(Operation::from_extension("jpg")));
    converter.select_files(vec![InputFile::new("sky.png", png(16, 9))]);

    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "sky.jpg");
    assert!(out[0].url.starts_with("object://"));

    let dir = tempfile::tempdir().unwrap();
    let saved = assert_ok!(converter.save_results(dir.path()));
    let bytes = std::fs::read(&saved[0]).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
}

#[tokio::test]
async fn image_to_pdf_page_matches_image() {
    let converter = converter();
    converter.select_category(Category::Image);
    assert_ok!(converter.select_operation(Operation::from_extension("pdf")));
    converter.select_files(vec![InputFile::new("badge.png", png(40, 20))]);

    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "badge.pdf");
    assert_eq!(page_count(&result_bytes(&converter)), 1);
}

#[tokio::test]
async fn merge_sums_pages_in_order() {
    let converter = converter();
    converter.select_category(Category::Pdf);
    assert_ok!(converter.select_operation(Operation::Merge));
    converter.select_files(vec![
        InputFile::new("a.pdf", pdf_with_pages(3)),
        InputFile::new("b.pdf", pdf_with_pages(4)),
        InputFile::new("c.pdf", pdf_with_pages(1)),
    ]);

    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "merged.pdf");
    assert_eq!(page_count(&result_bytes(&converter)), 8);
    assert_eq!(converter.history().load()[0].inputs, "a.pdf, b.pdf, c.pdf");
}

#[tokio::test]
async fn split_clamps_and_allows_empty_ranges() {
    let converter = converter();
    converter.select_category(Category::Pdf);
    assert_ok!(converter.select_operation(Operation::Split));
    converter.select_files(vec![InputFile::new("book.pdf", pdf_with_pages(10))]);

    converter.set_page_range(Some(PageRange::new(0, Some(999))));
    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "book_pages_1-10.pdf");
    assert_eq!(page_count(&result_bytes(&converter)), 10);

    converter.set_page_range(Some(PageRange::new(5, Some(3))));
    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "book_pages_5-3.pdf");
    assert_eq!(page_count(&result_bytes(&converter)), 0);

    converter.set_page_range(Some("2-4".parse().unwrap()));
    assert_ok!(converter.convert().await);
    assert_eq!(page_count(&result_bytes(&converter)), 3);
}

#[tokio::test]
async fn csv_json_csv_round_trip() {
    let converter = converter();
    converter.select_category(Category::Document);
    assert_ok!(converter.select_operation(Operation::from_extension("json")));
    converter.select_files(vec![InputFile::new(
        "people.csv",
        b"name,role\nAda,engineer\nGrace,admiral\n".to_vec(),
    )]);
    assert_ok!(converter.convert().await);
    let json = result_bytes(&converter);

    assert_ok!(converter.select_operation(Operation::from_extension("csv")));
    converter.select_files(vec![InputFile::new("people.json", json)]);
    let out = assert_ok!(converter.convert().await);
    assert_eq!(out[0].name, "people.csv");

    let csv = String::from_utf8(result_bytes(&converter)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "name,role");
    assert_eq!(lines[2], "\"Grace\",\"admiral\"");
}

#[tokio::test]
async fn malformed_json_fails_without_leaving_busy() {
    let converter = converter();
    converter.select_category(Category::Document);
    assert_ok!(converter.select_operation(Operation::from_extension("csv")));
    converter.select_files(vec![InputFile::new("broken.json", b"[{".to_vec())]);

    let err = assert_err!(converter.convert().await);
    assert_eq!(err.family(), "DecodeError");
    assert!(!converter.is_busy());

    // The converter is usable again straight away.
    converter.select_files(vec![InputFile::new("ok.json", b"[]".to_vec())]);
    assert_ok!(converter.convert().await);
}

#[tokio::test]
async fn editor_from_selection() {
    let converter = converter();
    converter.select_files(vec![InputFile::new("icon.png", png(6, 4))]);
    let mut editor = assert_ok!(converter.open_editor());
    editor.adjust(|s| {
        s.rotate_clockwise();
        s.set_saturation(0);
    });
    assert_eq!(editor.canvas_dimensions(), (4, 6));
    let exported = assert_ok!(editor.export());
    assert_eq!(exported.name, "icon_edited.png");
}
