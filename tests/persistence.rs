//! File round trips: nets, lessons, teachers, and delimited text.

use axon_nn::lesson::csv::{self, CsvSection, CsvSeparators};
use axon_nn::{Lesson, Network};

fn sample_net() -> Network {
    let mut net = Network::new();
    let i1 = net.add_input("A");
    let i2 = net.add_input("B");
    let h = net.add_hidden("H");
    let o = net.add_output("Y");
    net.add_link(i1, h).unwrap();
    net.add_link(i2, h).unwrap();
    net.add_link(h, o).unwrap();
    net.set_input_act_range(0, -1.0, 1.0).unwrap();
    net
}

fn sample_lesson() -> Lesson {
    let mut lesson = Lesson::new();
    lesson.set_input_count(2).unwrap();
    lesson.set_output_count(1).unwrap();
    lesson.set_input_name(0, "left").unwrap();
    for (a, b, y) in [(0.25, -1.5, 1.0), (3.0, 0.0, 0.5)] {
        lesson.add_pattern();
        lesson.set_pattern_input(0, a).unwrap();
        lesson.set_pattern_input(1, b).unwrap();
        lesson.set_pattern_output(0, y).unwrap();
    }
    lesson
}

#[test]
fn net_round_trip_preserves_topology_and_behavior() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("net.json");
    let path = path.to_str().unwrap();

    let mut original = sample_net();
    original.apply_input_act(0, 0.5).unwrap();
    original.apply_input_act(1, 0.25).unwrap();
    original.think_step();
    let expected = original.output_out(0).unwrap();

    original.save_json(path).unwrap();
    let mut restored = Network::load_json(path).unwrap();

    assert_eq!(restored.input_count(), 2);
    assert_eq!(restored.hidden_count_all(), 1);
    assert_eq!(restored.links().len(), 3);
    assert!(restored.is_fully_resolved());
    assert_eq!(restored.input_act_range_min(0).unwrap(), -1.0);

    restored.apply_input_act(0, 0.5).unwrap();
    restored.apply_input_act(1, 0.25).unwrap();
    restored.think_step();
    assert_eq!(restored.output_out(0).unwrap(), expected);
}

#[test]
fn lesson_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lesson.json");
    let path = path.to_str().unwrap();

    let lesson = sample_lesson();
    lesson.save_json(path).unwrap();
    let restored = Lesson::load_json(path).unwrap();

    assert_eq!(restored.pattern_count(), 2);
    assert_eq!(restored.input_name(0).unwrap(), "left");
    assert_eq!(restored.pattern(0).unwrap().inputs, vec![0.25, -1.5]);
    assert_eq!(restored.pattern(1).unwrap().outputs, vec![0.5]);
}

#[test]
fn csv_export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lesson.csv");
    let path = path.to_str().unwrap();

    let lesson = sample_lesson();
    csv::export_lesson(&lesson, path, 0, true, CsvSection::Full, CsvSeparators::default())
        .unwrap();

    let mut imported = Lesson::new();
    imported.set_input_count(2).unwrap();
    imported.set_output_count(1).unwrap();
    csv::import_lesson(&mut imported, path, true, CsvSection::Full, CsvSeparators::default())
        .unwrap();

    assert_eq!(imported.pattern_count(), 2);
    assert_eq!(imported.input_name(0).unwrap(), "left");
    assert_eq!(imported.pattern(0).unwrap().inputs, vec![0.25, -1.5]);
    assert_eq!(imported.pattern(1).unwrap().outputs, vec![0.5]);
}

#[test]
fn csv_with_semicolon_and_comma_decimals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lesson_de.csv");
    let path = path.to_str().unwrap();
    let seps = CsvSeparators { list_separator: ';', decimal_separator: ',' };

    let lesson = sample_lesson();
    csv::export_lesson(&lesson, path, 0, false, CsvSection::Full, seps).unwrap();

    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("0,25;-1,5"));

    let mut imported = Lesson::new();
    imported.set_input_count(2).unwrap();
    imported.set_output_count(1).unwrap();
    csv::import_lesson(&mut imported, path, false, CsvSection::Full, seps).unwrap();
    assert_eq!(imported.pattern(0).unwrap().inputs, vec![0.25, -1.5]);
}

#[test]
fn load_rejects_unknown_future_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.json");
    std::fs::write(
        &path,
        r#"{"format": 99, "input_names": [], "output_names": [], "patterns": [], "selected": 0, "output_data_enabled": true}"#,
    )
    .unwrap();
    assert!(Lesson::load_json(path.to_str().unwrap()).is_err());
}
