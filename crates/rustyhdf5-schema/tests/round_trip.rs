//! Dump → load round trips, in memory and through files on disk.

use rustyhdf5_schema::{
    dump, load, Array, AttributeAccess, BindingState, Bytes, Dataset, DumpProps, Error, H5Dataset,
    H5Enum, H5File, H5Group, LoadProps, RecordFile, ScalarValue, Selection, Store, StoreError,
    StorePath,
};

// ---- Schema ----

#[derive(H5Enum, Debug, Clone, Copy, PartialEq)]
#[h5(repr = i32)]
enum Mode {
    Idle = 0,
    Scan = 1,
    Calibrate = 5,
}

#[derive(H5Dataset, Debug, Default, PartialEq)]
#[h5(shape(3, 5), dtype = i32)]
struct Image {
    exposure: f64,
    mode: Mode,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle
    }
}

#[derive(H5Dataset, Debug, Default, PartialEq)]
#[h5(shape(_), dtype = f64)]
struct Trace;

#[derive(H5Dataset, Debug, Default, PartialEq)]
#[h5(shape(2), dtype = String)]
struct Labels;

#[derive(H5Group, Debug)]
struct Labelled {
    labels: Dataset<Labels>,
}

#[derive(H5Group, Debug, Clone, PartialEq)]
struct Sample {
    name: String,
    mass: f64,
}

#[derive(H5Group, Debug, PartialEq)]
struct Experiment {
    title: String,
    count: i64,
    enabled: bool,
    mode: Mode,
    checksum: Bytes,
    note: Option<String>,
    sample: Sample,
    backup: Option<Sample>,
    runs: Vec<Sample>,
    image: Dataset<Image>,
    trace: Option<Dataset<Trace>>,
}

fn sample(name: &str, mass: f64) -> Sample {
    Sample {
        name: name.to_string(),
        mass,
    }
}

fn experiment() -> Experiment {
    Experiment {
        title: "beam test".into(),
        count: -3,
        enabled: true,
        mode: Mode::Calibrate,
        checksum: Bytes(vec![0xde, 0xad]),
        note: None,
        sample: sample("quartz", 2.5),
        backup: None,
        runs: vec![sample("a", 1.0), sample("b", 2.0)],
        image: Dataset::with_data(
            Image {
                exposure: 0.25,
                mode: Mode::Scan,
            },
            Array::new(vec![3, 5], (0..15).collect()).unwrap(),
        )
        .unwrap(),
        trace: Some(Dataset::with_data(Trace, Array::from_vec(vec![1.5, 2.5, 3.5, 4.5])).unwrap()),
    }
}

// ---- In-memory round trips ----

#[test]
fn full_tree_round_trip() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    let report = dump(&mut exp, &file, &DumpProps::new()).unwrap();
    assert!(report.is_complete());

    let (loaded, report) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
    assert!(report.is_clean(), "unmapped: {:?}", report.unmapped());
    assert_eq!(loaded, exp);
    assert_eq!(loaded.image.state(), BindingState::Written);
    assert_eq!(loaded.image.exposure, 0.25);
    assert_eq!(loaded.image.get(&[2, 4]).unwrap(), 14);
}

#[test]
fn construction_buffer_stays_immutable_after_dump() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();
    assert_eq!(exp.image.state(), BindingState::BoundAtConstruction);
    assert!(matches!(
        exp.image.set(&[0, 0], 99),
        Err(Error::ImmutableDataset(_))
    ));
}

#[test]
fn list_order_preserved() {
    let mut exp = experiment();
    exp.runs = (0..12).map(|i| sample(&format!("run{i}"), i as f64)).collect();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();

    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
    let names: Vec<&str> = loaded.runs.iter().map(|s| s.name.as_str()).collect();
    let expected: Vec<String> = (0..12).map(|i| format!("run{i}")).collect();
    assert_eq!(names, expected);
}

#[test]
fn empty_list_round_trip() {
    let mut exp = experiment();
    exp.runs.clear();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();
    assert!(file.exists(&StorePath::parse("/runs")).unwrap());

    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
    assert!(loaded.runs.is_empty());
}

#[test]
fn absent_optionals_are_not_written() {
    let mut exp = experiment();
    exp.trace = None;
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();

    let root = file.open_group(&StorePath::root()).unwrap();
    assert!(root.attribute("note").unwrap().is_none());
    assert!(!file.exists(&StorePath::parse("/backup")).unwrap());
    assert!(!file.exists(&StorePath::parse("/trace")).unwrap());

    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
    assert_eq!(loaded.note, None);
    assert_eq!(loaded.backup, None);
    assert!(loaded.trace.is_none());
}

#[test]
fn present_optionals_round_trip() {
    let mut exp = experiment();
    exp.note = Some("second shift".into());
    exp.backup = Some(sample("spare", 0.5));
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();

    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
    assert_eq!(loaded.note.as_deref(), Some("second shift"));
    assert_eq!(loaded.backup, Some(sample("spare", 0.5)));
}

#[test]
fn every_enum_member_round_trips() {
    for mode in [Mode::Idle, Mode::Scan, Mode::Calibrate] {
        let mut exp = experiment();
        exp.mode = mode;
        let file = H5File::in_memory();
        dump(&mut exp, &file, &DumpProps::new()).unwrap();
        let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();
        assert_eq!(loaded.mode, mode);
    }
}

#[test]
fn enum_attribute_carries_member_mapping() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();

    let root = file.open_group(&StorePath::root()).unwrap();
    let attr = root.attribute("mode").unwrap().unwrap();
    assert_eq!(attr.value, ScalarValue::I32(5));
    assert_eq!(attr.dtype.to_string(), "enum<i32>[Idle=0, Scan=1, Calibrate=5]");
}

#[test]
fn bool_is_stored_as_u8() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();
    let root = file.open_group(&StorePath::root()).unwrap();
    assert_eq!(root.attribute("enabled").unwrap().unwrap().value, ScalarValue::U8(1));
}

#[test]
fn dump_under_a_subgroup() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new().root("/run1")).unwrap();
    assert!(file.exists(&StorePath::parse("/run1/sample")).unwrap());

    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new().root("/run1")).unwrap();
    assert_eq!(loaded.sample, exp.sample);
}

#[test]
fn loaded_datasets_read_lazily_through_the_file() {
    let mut exp = experiment();
    let file = H5File::in_memory();
    dump(&mut exp, &file, &DumpProps::new()).unwrap();
    let (loaded, _) = load::<Experiment>(&file, &LoadProps::new()).unwrap();

    let row = loaded.image.read(&Selection::slice(&[1..2, 0..5])).unwrap();
    assert_eq!(row, vec![5, 6, 7, 8, 9]);

    file.close().unwrap();
    assert!(matches!(
        loaded.image.read_all(),
        Err(Error::Store(StoreError::Closed))
    ));
}

#[test]
fn loaded_dataset_can_be_dumped_again() {
    let mut exp = experiment();
    let first = H5File::in_memory();
    dump(&mut exp, &first, &DumpProps::new()).unwrap();
    let (mut loaded, _) = load::<Experiment>(&first, &LoadProps::new()).unwrap();

    let second = H5File::in_memory();
    dump(&mut loaded, &second, &DumpProps::new()).unwrap();
    let (copy, _) = load::<Experiment>(&second, &LoadProps::new()).unwrap();
    assert_eq!(copy, exp);
}

// ---- Files on disk ----

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.h5.json");

    let mut exp = experiment();
    exp.dump(&path).unwrap();

    let loaded = Experiment::load_file(&path).unwrap();
    assert!(loaded.report().is_clean());
    assert_eq!(*loaded, exp);
    assert_eq!(loaded.trace.as_ref().unwrap().shape().unwrap(), vec![4]);
    loaded.close().unwrap();
}

#[test]
fn non_finite_dataset_values_survive_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("non_finite.h5.json");

    let mut exp = experiment();
    exp.trace = Some(
        Dataset::with_data(
            Trace,
            Array::from_vec(vec![1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY]),
        )
        .unwrap(),
    );
    exp.dump(&path).unwrap();

    let loaded = Experiment::load_file(&path).unwrap();
    assert_eq!(loaded.title, "beam test");
    let trace = loaded.trace.as_ref().unwrap().read_all().unwrap().into_vec();
    assert_eq!(trace[0], 1.0);
    assert!(trace[1].is_nan());
    assert_eq!(trace[2], f64::INFINITY);
    assert_eq!(trace[3], f64::NEG_INFINITY);
}

#[test]
fn string_elements_with_nul_are_rejected() {
    let mut rec = Labelled {
        labels: Dataset::with_data(Labels, Array::from_vec(vec!["ok".to_string(), "a\0b".to_string()]))
            .unwrap(),
    };
    let file = H5File::in_memory();
    let err = dump(&mut rec, &file, &DumpProps::new()).unwrap_err();
    assert!(matches!(err, Error::ElementWrite { ref path, .. } if path == "/labels"));
    assert!(!file.exists(&StorePath::parse("/labels")).unwrap());

    let mut rec = Labelled {
        labels: Dataset::default(),
    };
    let file = H5File::in_memory();
    dump(&mut rec, &file, &DumpProps::new().partial()).unwrap();
    let err = rec
        .labels
        .assign(&Selection::All, &["x".to_string(), "\0".to_string()])
        .unwrap_err();
    assert!(matches!(err, Error::ElementWrite { ref path, .. } if path == "/labels"));
    assert_eq!(rec.labels.state(), BindingState::BoundWritable);

    rec.labels.assign(&Selection::All, &["x".to_string(), "y".to_string()]).unwrap();
    assert_eq!(rec.labels.get(&[1]).unwrap(), "y");
}

#[test]
fn file_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.h5.json");
    experiment().dump(&path).unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let root = &doc["root"];
    assert_eq!(root["kind"], "group");
    assert_eq!(root["children"]["image"]["kind"], "dataset");
    assert_eq!(root["children"]["image"]["shape"], serde_json::json!([3, 5]));
    assert!(root["children"]["runs"]["children"]["1"]["attrs"]["name"].is_object());
    assert!(root["attrs"]["title"].is_object());
}

#[test]
fn loaded_file_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.h5.json");
    experiment().dump(&path).unwrap();

    let mut loaded = Experiment::load_file(&path).unwrap();
    let err = loaded.image.set(&[0, 0], 1).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::ReadOnly(_))));
}

#[test]
fn load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Experiment::load_file(dir.path().join("missing.h5.json")).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Io(_))));
}
