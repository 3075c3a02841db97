//! Entity resolver: alias registry and mention extraction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use sift_db::queries::entities as queries;
use sift_db::DbPool;

use crate::cache::{Clock, TtlCache};
use crate::error::{SiftError, SiftResult};
use crate::schema::SchemaCatalog;
use super::model::{MatchType, ResolvedEntity, SemanticEntity};

/// Minimum token length considered by the fuzzy pass.
const MIN_FUZZY_TOKEN: usize = 3;

/// Snapshot of every entity and alias, rebuilt as a whole on refresh.
#[derive(Debug, Default)]
pub struct EntityIndex {
    entities: Vec<SemanticEntity>,
    by_name: HashMap<String, usize>,
    /// Lowercased alias -> entity index. Later registrations overwrite.
    aliases: HashMap<String, usize>,
    /// Aliases in first-registration order, for deterministic extraction.
    alias_order: Vec<String>,
}

impl EntityIndex {
    pub fn new(entities: Vec<SemanticEntity>) -> Self {
        let mut index = Self {
            by_name: HashMap::with_capacity(entities.len()),
            ..Self::default()
        };

        for (idx, entity) in entities.iter().enumerate() {
            index.by_name.insert(entity.name.clone(), idx);
        }
        for (idx, entity) in entities.iter().enumerate() {
            index.register(&entity.name, idx);
            index.register(&entity.display_name, idx);
        }
        for (idx, entity) in entities.iter().enumerate() {
            for alias in &entity.aliases {
                index.register(alias, idx);
            }
        }

        index.entities = entities;
        index
    }

    fn register(&mut self, alias: &str, idx: usize) {
        let key = alias.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        if self.aliases.insert(key.clone(), idx).is_none() {
            self.alias_order.push(key);
        }
    }

    pub fn entities(&self) -> &[SemanticEntity] {
        &self.entities
    }

    pub fn get(&self, name: &str) -> Option<&SemanticEntity> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn resolve(&self, text: &str) -> Option<&SemanticEntity> {
        self.aliases
            .get(&text.trim().to_lowercase())
            .map(|&i| &self.entities[i])
    }

    /// Find entity mentions in free text, best match first.
    pub fn extract(&self, query: &str) -> Vec<ResolvedEntity> {
        let lowered = query.to_lowercase();

        let mut found = self.alias_pass(&lowered);
        if found.is_empty() {
            found = self.fuzzy_pass(&lowered);
        }

        // Stable: equal confidences keep discovery order.
        found.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        found
    }

    fn alias_pass(&self, query: &str) -> Vec<ResolvedEntity> {
        let mut found = Vec::new();
        for alias in &self.alias_order {
            if !query.contains(alias.as_str()) {
                continue;
            }
            let idx = self.aliases[alias];
            let entity = &self.entities[idx];
            let match_type = if *alias == entity.name.to_lowercase() {
                MatchType::Exact
            } else {
                MatchType::Alias
            };
            push_best(&mut found, entity, alias, match_type);
        }
        found
    }

    fn fuzzy_pass(&self, query: &str) -> Vec<ResolvedEntity> {
        let mut found = Vec::new();
        let tokens = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| t.chars().count() >= MIN_FUZZY_TOKEN);

        for token in tokens {
            for entity in &self.entities {
                let name = entity.name.to_lowercase();
                let display = entity.display_name.to_lowercase();
                let hit = [name, display]
                    .iter()
                    .map(|candidate| candidate.trim())
                    .filter(|candidate| !candidate.is_empty())
                    .any(|candidate| candidate.contains(token) || token.contains(candidate));
                if hit {
                    push_best(&mut found, entity, token, MatchType::Fuzzy);
                }
            }
        }
        found
    }

    /// Entities this one points at, then entities pointing at it.
    pub fn related(&self, name: &str) -> Vec<SemanticEntity> {
        let Some(entity) = self.get(name) else {
            return Vec::new();
        };

        let mut related: Vec<&SemanticEntity> = Vec::new();
        for rel in &entity.relationships {
            if let Some(target) = self.get(&rel.target) {
                if target.name != entity.name && !related.iter().any(|e| e.name == target.name) {
                    related.push(target);
                }
            }
        }
        for other in &self.entities {
            let points_here = other.relationships.iter().any(|r| r.target == entity.name);
            if points_here && other.name != entity.name && !related.iter().any(|e| e.name == other.name) {
                related.push(other);
            }
        }
        related.into_iter().cloned().collect()
    }
}

/// Keep one result per entity, upgrading it in place on a better match.
fn push_best(found: &mut Vec<ResolvedEntity>, entity: &SemanticEntity, alias: &str, match_type: MatchType) {
    let confidence = match_type.confidence();
    if let Some(existing) = found.iter_mut().find(|r| r.entity.name == entity.name) {
        if confidence > existing.confidence {
            existing.matched_alias = alias.to_string();
            existing.confidence = confidence;
            existing.match_type = match_type;
        }
        return;
    }
    found.push(ResolvedEntity {
        entity: entity.clone(),
        matched_alias: alias.to_string(),
        confidence,
        match_type,
    });
}

/// Registry of semantic entities backed by the store, cached with a TTL.
pub struct EntityResolver {
    pool: DbPool,
    catalog: Arc<SchemaCatalog>,
    cache: TtlCache<EntityIndex>,
}

impl EntityResolver {
    pub fn new(pool: DbPool, catalog: Arc<SchemaCatalog>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            catalog,
            cache: TtlCache::new("entities", ttl, clock),
        }
    }

    fn index(&self) -> SiftResult<Arc<EntityIndex>> {
        self.cache.get_or_refresh(|| -> SiftResult<EntityIndex> {
            let rows = queries::list_entities(&self.pool)?;
            let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
            for alias in queries::list_aliases(&self.pool)? {
                aliases.entry(alias.entity_name).or_default().push(alias.alias);
            }

            let entities: Vec<SemanticEntity> = rows
                .into_iter()
                .map(|row| {
                    let explicit = aliases.remove(&row.name).unwrap_or_default();
                    SemanticEntity::from_row(row, explicit)
                })
                .collect();
            info!(entities = entities.len(), "Entity registry refreshed");
            Ok(EntityIndex::new(entities))
        })
    }

    pub fn get_all_entities(&self) -> SiftResult<Vec<SemanticEntity>> {
        Ok(self.index()?.entities().to_vec())
    }

    pub fn get_entity(&self, name: &str) -> SiftResult<Option<SemanticEntity>> {
        let entity = self.index()?.get(name).cloned();
        if entity.is_none() {
            debug!(entity = name, "Entity not registered");
        }
        Ok(entity)
    }

    /// Case-insensitive lookup by name, display name or alias.
    pub fn resolve_alias(&self, text: &str) -> SiftResult<Option<SemanticEntity>> {
        Ok(self.index()?.resolve(text).cloned())
    }

    pub fn extract_entities(&self, query: &str) -> SiftResult<Vec<ResolvedEntity>> {
        let resolved = self.index()?.extract(query);
        debug!(matches = resolved.len(), "Entities extracted");
        Ok(resolved)
    }

    pub fn get_related(&self, name: &str) -> SiftResult<Vec<SemanticEntity>> {
        Ok(self.index()?.related(name))
    }

    /// Create or update an entity together with its explicit aliases.
    pub fn register_entity(&self, entity: &SemanticEntity) -> SiftResult<()> {
        if entity.name.trim().is_empty() {
            return Err(SiftError::invalid("entity name must not be empty"));
        }
        // Node ids are `{entity}:{row}`.
        if entity.name.contains(':') {
            return Err(SiftError::invalid(format!("entity name '{}' must not contain ':'", entity.name)));
        }
        if entity.display_name.trim().is_empty() {
            return Err(SiftError::invalid("display_name must not be empty"));
        }
        if entity.weight < 0.0 || !entity.weight.is_finite() {
            return Err(SiftError::invalid(format!("entity weight {} is not a non-negative number", entity.weight)));
        }
        if self.catalog.get_table(&entity.source_table)?.is_none() {
            return Err(SiftError::invalid(format!(
                "source table '{}' does not exist",
                entity.source_table
            )));
        }

        queries::upsert_entity(
            &self.pool,
            &entity.name,
            &entity.display_name,
            entity.description.as_deref(),
            &entity.source_table,
            entity.domain_owner.as_deref(),
            &serde_json::to_string(&entity.fields)?,
            &serde_json::to_string(&entity.relationships)?,
            entity.weight,
        )?;
        for alias in &entity.aliases {
            queries::add_alias(&self.pool, alias, &entity.name)?;
        }

        info!(entity = %entity.name, table = %entity.source_table, "Entity registered");
        self.clear_cache();
        Ok(())
    }

    /// Replace the entity stored under `name`. Renaming is rejected.
    pub fn update_entity(&self, name: &str, entity: &SemanticEntity) -> SiftResult<()> {
        if entity.name != name {
            return Err(SiftError::invalid(format!(
                "entity '{}' cannot be renamed to '{}'",
                name, entity.name
            )));
        }
        queries::get_entity(&self.pool, name)?;
        self.register_entity(entity)
    }

    pub fn add_alias(&self, alias: &str, entity_name: &str) -> SiftResult<()> {
        if alias.trim().is_empty() {
            return Err(SiftError::invalid("alias must not be empty"));
        }
        queries::add_alias(&self.pool, alias.trim(), entity_name)?;
        self.clear_cache();
        Ok(())
    }

    pub fn remove_alias(&self, alias: &str, entity_name: &str) -> SiftResult<()> {
        queries::remove_alias(&self.pool, alias.trim(), entity_name)?;
        self.clear_cache();
        Ok(())
    }

    pub fn remove_entity(&self, name: &str) -> SiftResult<()> {
        queries::delete_entity(&self.pool, name)?;
        info!(entity = name, "Entity removed");
        self.clear_cache();
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::testing;

    fn resolver() -> (EntityResolver, Arc<ManualClock>) {
        let pool = testing::seeded_pool();
        let clock = Arc::new(ManualClock::new());
        let catalog = Arc::new(SchemaCatalog::new(pool.clone(), Duration::from_secs(600), clock.clone()));
        let resolver = EntityResolver::new(pool, catalog, Duration::from_secs(300), clock.clone());
        (resolver, clock)
    }

    #[test]
    fn test_alias_scenario() {
        let (resolver, _) = resolver();
        let found = resolver.extract_entities("show our top clients").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity.name, "customer");
        assert_eq!(found[0].matched_alias, "client");
        assert_eq!(found[0].confidence, 0.95);
        assert_eq!(found[0].match_type, MatchType::Alias);
    }

    #[test]
    fn test_exact_beats_alias_and_sorts() {
        let (resolver, _) = resolver();
        let found = resolver
            .extract_entities("Which client placed the ORDER for a product?")
            .unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.entity.name.as_str()).collect();
        assert_eq!(names, vec!["order", "product", "customer"]);
        assert!(found.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(found[0].match_type, MatchType::Exact);
    }

    #[test]
    fn test_one_result_per_entity() {
        let (resolver, _) = resolver();
        let found = resolver.extract_entities("customer client customers").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].match_type, MatchType::Exact);
        assert_eq!(found[0].confidence, 1.0);
    }

    #[test]
    fn test_fuzzy_fallback() {
        let (resolver, _) = resolver();
        let found = resolver.extract_entities("any cust records?").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity.name, "customer");
        assert_eq!(found[0].matched_alias, "cust");
        assert_eq!(found[0].match_type, MatchType::Fuzzy);
        assert_eq!(found[0].confidence, 0.70);

        // Tokens under three characters never match.
        assert!(resolver.extract_entities("cu or ta").unwrap().is_empty());
    }

    #[test]
    fn test_no_overlap_is_empty() {
        let (resolver, _) = resolver();
        assert!(resolver.extract_entities("weather in lisbon").unwrap().is_empty());
        assert!(resolver.extract_entities("").unwrap().is_empty());
    }

    #[test]
    fn test_blank_display_name_matches_nothing() {
        let index = EntityIndex::new(vec![
            SemanticEntity::new("customer", "Customer", "customers"),
            SemanticEntity::new("ledger", "", "ledgers"),
        ]);
        assert!(index.extract("weather in lisbon").is_empty());
        assert_eq!(index.extract("any cust records?")[0].entity.name, "customer");
    }

    #[test]
    fn test_resolve_alias_case_insensitive() {
        let (resolver, _) = resolver();
        let upper = resolver.resolve_alias("CLIENT").unwrap().unwrap();
        let lower = resolver.resolve_alias("client").unwrap().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.name, "customer");
        assert_eq!(resolver.resolve_alias("Order").unwrap().unwrap().name, "order");
        assert!(resolver.resolve_alias("nobody").unwrap().is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let index = EntityIndex::new(vec![
            SemanticEntity {
                aliases: vec!["buyer".into()],
                ..SemanticEntity::new("customer", "Customer", "customers")
            },
            SemanticEntity {
                aliases: vec!["Buyer".into()],
                ..SemanticEntity::new("account", "Account", "accounts")
            },
        ]);
        assert_eq!(index.resolve("buyer").unwrap().name, "account");
    }

    #[test]
    fn test_related_both_directions() {
        let (resolver, _) = resolver();
        let related: Vec<String> = resolver
            .get_related("product")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(related, vec!["tag"]);

        let related: Vec<String> = resolver.get_related("tag").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(related, vec!["product"]);
        assert!(resolver.get_related("missing").unwrap().is_empty());
    }

    #[test]
    fn test_ttl_and_admin_invalidation() {
        let (resolver, clock) = resolver();
        assert!(resolver.resolve_alias("buyer").unwrap().is_none());

        // Writes behind the resolver's back only show after the TTL.
        queries::add_alias(&resolver.pool, "buyer", "customer").unwrap();
        clock.advance(Duration::from_secs(120));
        assert!(resolver.resolve_alias("buyer").unwrap().is_none());
        clock.advance(Duration::from_secs(181));
        assert!(resolver.resolve_alias("buyer").unwrap().is_some());

        // Admin operations invalidate immediately.
        resolver.add_alias("patron", "customer").unwrap();
        assert_eq!(resolver.resolve_alias("Patron").unwrap().unwrap().name, "customer");
        resolver.remove_alias("patron", "customer").unwrap();
        assert!(resolver.resolve_alias("patron").unwrap().is_none());
    }

    #[test]
    fn test_register_validates_source_table() {
        let (resolver, _) = resolver();
        let bad = SemanticEntity::new("invoice", "Invoice", "invoices");
        assert!(matches!(resolver.register_entity(&bad), Err(SiftError::InvalidRequest(_))));

        let good = SemanticEntity {
            aliases: vec!["persona".into()],
            ..SemanticEntity::new("profile", "Profile", "profiles")
        };
        resolver.register_entity(&good).unwrap();
        assert_eq!(resolver.resolve_alias("persona").unwrap().unwrap().name, "profile");
    }

    #[test]
    fn test_register_rejects_unusable_names() {
        let (resolver, _) = resolver();
        let with_colon = SemanticEntity::new("customer:vip", "VIP", "customers");
        assert!(matches!(resolver.register_entity(&with_colon), Err(SiftError::InvalidRequest(_))));

        let blank_display = SemanticEntity::new("profile", "  ", "profiles");
        assert!(matches!(resolver.register_entity(&blank_display), Err(SiftError::InvalidRequest(_))));
        assert!(resolver.get_entity("profile").unwrap().is_none());
    }

    #[test]
    fn test_update_rejects_rename_and_remove() {
        let (resolver, _) = resolver();
        let renamed = SemanticEntity::new("client", "Client", "customers");
        assert!(matches!(
            resolver.update_entity("customer", &renamed),
            Err(SiftError::InvalidRequest(_))
        ));

        resolver.remove_entity("tag").unwrap();
        assert!(resolver.get_entity("tag").unwrap().is_none());
        assert!(resolver.remove_entity("tag").unwrap_err().is_not_found());
    }
}
