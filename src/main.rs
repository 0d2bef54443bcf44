use std::env;
use std::fs::create_dir_all;
use std::io;
use std::path::Path;

use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_store::config::load_user_config;
use osm_store::data::e7_to_degrees;
use osm_store::errors::Result;
use osm_store::etl::parse_osm::{self, ParseOsmEtl};
use osm_store::etl::Etl;
use osm_store::{ElementKind, Storage};

const DEFAULT_CONFIG_PATH: &str = "config/store.json";

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(Path::new(&config_path))?;
    setup_logging(&user_config.log_level);

    let output_dir = user_config.cache_dir()?;
    create_dir_all(&output_dir)?;
    ParseOsmEtl::new(&user_config).process(&output_dir)?;

    let batch = parse_osm::read_cache(&output_dir.join(parse_osm::OUTPUT_FILE_NAME))?;
    let mut storage = Storage::with_cell_size(user_config.cell_size_e7);
    let loaded = storage.ingest(tqdm::tqdm(batch.elements.into_iter()), batch.bounds)?;

    info!(
        loaded = loaded,
        nodes = storage.count(ElementKind::Node),
        ways = storage.count(ElementKind::Way),
        relations = storage.count(ElementKind::Relation);
        "Storage ready"
    );
    if let Ok(bbox) = storage.calc_bounding_box_from_data() {
        info!(
            left = e7_to_degrees(bbox.left()),
            bottom = e7_to_degrees(bbox.bottom()),
            right = e7_to_degrees(bbox.right()),
            top = e7_to_degrees(bbox.top());
            "Data extent"
        );
    }

    if user_config.dump_storage {
        storage.log_storage(&mut io::stderr().lock())?;
    }

    Ok(())
}
