pub mod parse_osm;

use std::path::Path;
use log::{error, info};

use crate::errors::Result;

/// A pipeline step whose output is cached in a directory.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        let etl_name = self.etl_name().to_string();
        info!(etl_name = etl_name.as_str(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = etl_name.as_str(); "Using cached value");
            return Ok(());
        }

        let input = logged(&etl_name, "Extracting", self.extract(dir))?;
        let output = logged(&etl_name, "Transforming", self.transform(input))?;
        logged(&etl_name, "Loading", self.load(dir, output))?;

        info!(etl_name = etl_name.as_str(); "Process finished");
        Ok(())
    }
}

fn logged<T>(etl_name: &str, step: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => info!(etl_name = etl_name, step = step; "Step finished"),
        Err(err) => error!(etl_name = etl_name, step = step, err = err.message.as_str(); "Step failed with error"),
    }
    result
}
