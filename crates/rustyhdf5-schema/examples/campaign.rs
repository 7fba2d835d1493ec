//! Dump a small measurement campaign, fill one dataset after the dump, then
//! load it back and print what was stored.
//!
//! Run with `RUST_LOG=debug` to see every group, attribute and dataset the
//! engines touch.

use rustyhdf5_schema::{
    Array, Dataset, DumpProps, H5Dataset, H5Enum, H5Group, RecordFile, Result, Selection,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(H5Enum, Debug, Clone, Copy, PartialEq)]
#[h5(repr = u8)]
enum Detector {
    Silicon = 1,
    Germanium = 2,
}

#[derive(H5Dataset, Debug, Default)]
#[h5(shape(_), dtype = f64)]
struct Spectrum {
    bin_width: f64,
}

#[derive(H5Dataset, Debug, Default)]
#[h5(shape(4, 4), dtype = u16)]
struct Hitmap;

#[derive(H5Group, Debug)]
struct Run {
    number: u32,
    detector: Detector,
    spectrum: Dataset<Spectrum>,
}

#[derive(H5Group, Debug)]
struct Campaign {
    site: String,
    operator: Option<String>,
    runs: Vec<Run>,
    hitmap: Dataset<Hitmap>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dir = std::env::temp_dir().join("rustyhdf5-schema-campaign");
    std::fs::create_dir_all(&dir).map_err(rustyhdf5_schema::StoreError::from)?;
    let path = dir.join("campaign.h5.json");

    let runs = (1..=3)
        .map(|number| {
            let counts: Vec<f64> = (0..8).map(|i| f64::from(number * i)).collect();
            Ok(Run {
                number,
                detector: if number % 2 == 0 { Detector::Germanium } else { Detector::Silicon },
                spectrum: Dataset::with_data(Spectrum { bin_width: 0.5 }, Array::from_vec(counts))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut campaign = Campaign {
        site: "north hall".into(),
        operator: None,
        runs,
        hitmap: Dataset::default(),
    };

    campaign.dumper(&path, &DumpProps::new(), |campaign| {
        let hits: Vec<u16> = (0..16).map(|i| (i * 3) % 7).collect();
        campaign.hitmap.assign(&Selection::All, &hits)
    })?;
    println!("wrote {}", path.display());

    let loaded = Campaign::load_file(&path)?;
    println!("site: {}", loaded.site);
    for run in &loaded.runs {
        let spectrum = run.spectrum.read_all()?;
        println!(
            "run {} ({:?}): {} bins of width {}, total {}",
            run.number,
            run.detector,
            spectrum.len(),
            run.spectrum.bin_width,
            spectrum.as_slice().iter().sum::<f64>()
        );
    }
    let row = loaded.hitmap.read(&Selection::slice(&[1..2, 0..4]))?;
    println!("hitmap row 1: {row:?}");
    if !loaded.report().is_clean() {
        println!("unmapped keys: {:?}", loaded.report().unmapped());
    }
    loaded.close()
}
