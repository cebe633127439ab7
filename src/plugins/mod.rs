//! Plugins shipped with etlflow.
//!
//! - [`gcs`]: batch extraction from a public object-storage bucket
//! - [`fantasyace`]: sports, events and odds from cloud-function endpoints
//! - [`sports`]: odds event validation, flattening and normalisation
//! - [`scaling`]: numeric scaling transform
//!
//! Each plugin is registered in the built-in catalog under its module path,
//! e.g. `etlflow::plugins::gcs::GcsDataExtractor`.

pub mod fantasyace;
pub mod gcs;
pub mod scaling;
pub mod sports;

pub use fantasyace::{FantasyAceCloudFunctions, FantasyAceSettings};
pub use gcs::{GcsDataExtractor, GcsSettings};
pub use scaling::{ScalingSettings, ScalingTransformer};
pub use sports::{flatten_event, validate_event, SportsOddsSettings, SportsOddsTransformer};

use std::time::Duration;

use crate::registry::{parse_parameters, Plugin, PluginCatalog};
use crate::retry::RetryPolicy;

/// Registers every built-in plugin in `catalog`.
pub fn register_builtin(catalog: &mut PluginCatalog) {
    catalog.register(gcs::MODULE, gcs::ENTRY_POINT, |params| {
        let settings: GcsSettings = parse_parameters(params)?;
        Ok(Box::new(GcsDataExtractor::new(settings)?) as Box<dyn Plugin>)
    });
    catalog.register(fantasyace::MODULE, fantasyace::ENTRY_POINT, |params| {
        let settings: FantasyAceSettings = parse_parameters(params)?;
        Ok(Box::new(FantasyAceCloudFunctions::new(settings)?) as Box<dyn Plugin>)
    });
    catalog.register(sports::MODULE, sports::ENTRY_POINT, |params| {
        let settings: SportsOddsSettings = parse_parameters(params)?;
        Ok(Box::new(SportsOddsTransformer::new(settings)) as Box<dyn Plugin>)
    });
    catalog.register(scaling::MODULE, scaling::ENTRY_POINT, |params| {
        let settings: ScalingSettings = parse_parameters(params)?;
        Ok(Box::new(ScalingTransformer::new(settings)?) as Box<dyn Plugin>)
    });
}

/// Fixed-delay policy built from `max_retries` / `retry_delay_secs` parameters.
pub(crate) fn fixed_delay_policy(max_retries: u32, retry_delay_secs: f64) -> Result<RetryPolicy, String> {
    let delay = Duration::try_from_secs_f64(retry_delay_secs).map_err(|_| {
        format!(
            "retry_delay_secs must be a non-negative number, got {}",
            retry_delay_secs
        )
    })?;
    Ok(RetryPolicy::new()
        .with_max_attempts(max_retries.max(1))
        .with_base_delay(delay)
        .with_backoff_multiplier(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginTarget;

    #[test]
    fn test_builtin_catalog_targets() {
        let catalog = PluginCatalog::builtin();
        for (module, entry) in [
            (gcs::MODULE, gcs::ENTRY_POINT),
            (fantasyace::MODULE, fantasyace::ENTRY_POINT),
            (sports::MODULE, sports::ENTRY_POINT),
            (scaling::MODULE, scaling::ENTRY_POINT),
        ] {
            assert!(catalog.contains(&PluginTarget::new(module, entry)));
        }
        assert_eq!(catalog.targets().len(), 4);
    }

    #[test]
    fn test_fixed_delay_policy() {
        let policy = fixed_delay_policy(0, 0.5).unwrap();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert!(fixed_delay_policy(3, -1.0).is_err());
    }
}
