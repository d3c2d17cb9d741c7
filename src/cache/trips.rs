use crate::cache::CacheService;
use crate::models::trip::TripSearch;
use redis::AsyncCommands;
use tracing::{debug, warn};

const SEARCH_PREFIX: &str = "trips:search:";
// Outside SEARCH_PREFIX so the KEYS sweep never removes it
const GENERATION_KEY: &str = "trips:search-generation";

/// Stable key for a set of search filters under one cache generation.
/// Text filters are case-insensitive, so is the key.
pub fn search_key(generation: u64, filters: &TripSearch) -> String {
    let part = |value: &Option<String>| {
        value
            .as_deref()
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default()
    };
    format!(
        "{}{}:{}|{}|{}|{}",
        SEARCH_PREFIX,
        generation,
        part(&filters.departure_city),
        part(&filters.departure_state),
        part(&filters.destination_camp),
        filters.date.map(|d| d.to_string()).unwrap_or_default(),
    )
}

impl CacheService {
    /// Current search cache generation, read before the database is queried.
    ///
    /// A result computed from a read that raced with a write is stored under the generation
    /// that write has already retired, so no later search picks it up. `None` when caching
    /// is off or redis does not answer.
    pub async fn search_generation(&self) -> Option<u64> {
        if !self.search_enabled {
            return None;
        }
        let mut conn = self.redis.conn.clone();
        let generation: Result<Option<u64>, _> = conn.get(GENERATION_KEY).await;
        match generation {
            Ok(generation) => Some(generation.unwrap_or(0)),
            Err(e) => {
                warn!("Search cache generation read failed: {}", e);
                None
            }
        }
    }

    /// Cached JSON of a search result. Redis trouble reads as a miss.
    pub async fn get_cached_search(&self, generation: u64, filters: &TripSearch) -> Option<String> {
        if !self.search_enabled {
            return None;
        }
        let mut conn = self.redis.conn.clone();
        let cached: Result<Option<String>, _> = conn.get(search_key(generation, filters)).await;
        match cached {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Search cache read failed: {}", e);
                None
            }
        }
    }

    pub async fn cache_search_result(&self, generation: u64, filters: &TripSearch, json: &str) {
        if !self.search_enabled {
            return;
        }
        let mut conn = self.redis.conn.clone();
        let result: Result<(), _> = conn
            .set_ex(search_key(generation, filters), json, self.search_ttl_seconds)
            .await;
        if let Err(e) = result {
            warn!("Search cache write failed: {}", e);
        }
    }

    // Any trip or booking write can change what a search returns.
    // Called after the write commits.
    pub async fn invalidate_trip_search(&self) {
        if !self.search_enabled {
            return;
        }
        let mut conn = self.redis.conn.clone();
        let bumped: Result<u64, _> = conn.incr(GENERATION_KEY, 1u64).await;
        if let Err(e) = bumped {
            warn!("Search cache generation bump failed: {}", e);
        }

        // Retired generations would expire anyway; this only frees the memory early
        let keys: Vec<String> = match redis::cmd("KEYS")
            .arg(format!("{}*", SEARCH_PREFIX))
            .query_async(&mut conn)
            .await
        {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Search cache invalidation failed: {}", e);
                return;
            }
        };
        if keys.is_empty() {
            return;
        }
        let count = keys.len();
        let deleted: Result<(), _> = conn.del(keys).await;
        if let Err(e) = deleted {
            warn!("Search cache invalidation failed: {}", e);
        } else {
            debug!("Invalidated {} cached trip searches", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn key_ignores_case_and_padding() {
        let a = TripSearch {
            departure_city: Some(" Lagos ".into()),
            destination_camp: Some("Iyana-Ipaja".into()),
            ..Default::default()
        };
        let b = TripSearch {
            departure_city: Some("LAGOS".into()),
            destination_camp: Some("iyana-ipaja".into()),
            ..Default::default()
        };
        assert_eq!(search_key(3, &a), search_key(3, &b));
    }

    #[test]
    fn key_distinguishes_filters() {
        let by_city = TripSearch { departure_city: Some("Abuja".into()), ..Default::default() };
        let by_state = TripSearch { departure_state: Some("Abuja".into()), ..Default::default() };
        assert_ne!(search_key(0, &by_city), search_key(0, &by_state));

        let dated = TripSearch {
            date: NaiveDate::from_ymd_opt(2025, 4, 2),
            ..Default::default()
        };
        assert_eq!(search_key(0, &dated), "trips:search:0:|||2025-04-02");
    }

    #[test]
    fn new_generation_never_reads_old_entries() {
        let filters = TripSearch { departure_city: Some("Ibadan".into()), ..Default::default() };
        assert_ne!(search_key(7, &filters), search_key(8, &filters));
        assert!(search_key(8, &filters).starts_with(SEARCH_PREFIX));
        assert!(!GENERATION_KEY.starts_with(SEARCH_PREFIX));
    }
}
