//! Catalog of categories, builders and fragment factories.
//!
//! Registration happens once at startup; afterwards the registry is only read,
//! so a single `RwLock` over all tables is enough.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::builder::{BuilderKind, Category, CategoryWithBuilders, Metadata};
use crate::context::Context;
use crate::error::{TagError, TagResult};
use crate::fragment::{Fragment, FragmentType};

/// Produces a fresh fragment of one type, used when decoding views.
pub type FragmentFactory = Arc<dyn Fn() -> Fragment + Send + Sync>;

#[derive(Default)]
struct Inner {
    builders: Vec<BuilderKind>,
    builders_map: HashMap<String, BuilderKind>,
    categories: Vec<Arc<Category>>,
    categories_map: HashMap<String, Arc<Category>>,
    fragments: HashMap<FragmentType, FragmentFactory>,
}

/// Thread-safe builder registry.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// An empty registry with no fragment factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry with the factories for all standard fragment types.
    pub fn standard() -> Self {
        let registry = Self::new();
        register_standard_fragments(&registry);
        registry
    }

    // ----- categories -----

    pub fn register_category(&self, category: Category) -> TagResult<()> {
        let mut inner = self.inner.write();
        if inner.categories_map.contains_key(&category.id) {
            return Err(TagError::duplicate("category", category.id));
        }
        let category = Arc::new(category);
        inner
            .categories_map
            .insert(category.id.clone(), Arc::clone(&category));
        inner.categories.push(category);
        Ok(())
    }

    /// Panics on failure. Startup wiring only.
    pub fn must_register_category(&self, category: Category) {
        if let Err(e) = self.register_category(category) {
            panic!("{e}");
        }
    }

    pub fn get_category(&self, id: &str) -> Option<Arc<Category>> {
        self.inner.read().categories_map.get(id).cloned()
    }

    pub fn must_get_category(&self, id: &str) -> Arc<Category> {
        match self.get_category(id) {
            Some(category) => category,
            None => panic!("category with ID {id:?} not found"),
        }
    }

    /// All categories in registration order.
    pub fn get_categories(&self) -> Vec<Arc<Category>> {
        self.inner.read().categories.clone()
    }

    // ----- builders -----

    /// Register a builder. Its category, if any, must already be registered.
    pub fn register_builder(&self, builder: impl Into<BuilderKind>) -> TagResult<()> {
        let builder = builder.into();
        let metadata = builder.metadata(&Context::background());

        let mut inner = self.inner.write();
        if inner.builders_map.contains_key(&metadata.id) {
            return Err(TagError::duplicate("builder", metadata.id.clone()));
        }
        if !metadata.category_id.is_empty()
            && !inner.categories_map.contains_key(&metadata.category_id)
        {
            return Err(TagError::UnknownCategory(metadata.category_id.clone()));
        }

        tracing::debug!("registered builder {:?}", metadata.id);
        inner
            .builders_map
            .insert(metadata.id.clone(), builder.clone());
        inner.builders.push(builder);
        Ok(())
    }

    /// Panics on failure. Startup wiring only.
    pub fn must_register_builder(&self, builder: impl Into<BuilderKind>) {
        if let Err(e) = self.register_builder(builder) {
            panic!("{e}");
        }
    }

    pub fn get_builder(&self, id: &str) -> Option<BuilderKind> {
        self.inner.read().builders_map.get(id).cloned()
    }

    pub fn must_get_builder(&self, id: &str) -> BuilderKind {
        match self.get_builder(id) {
            Some(builder) => builder,
            None => panic!("builder with ID {id:?} not found"),
        }
    }

    /// Builder metadata grouped by category.
    ///
    /// Every category appears, in registration order, even when empty.
    /// Builders keep registration order within their category.
    pub fn get_categories_with_builders(&self, ctx: &Context) -> Vec<CategoryWithBuilders> {
        let (categories, builders) = {
            let inner = self.inner.read();
            (inner.categories.clone(), inner.builders.clone())
        };

        let mut by_category: HashMap<String, Vec<Arc<Metadata>>> = HashMap::new();
        for builder in &builders {
            let metadata = builder.metadata(ctx);
            if !metadata.category_id.is_empty() {
                by_category
                    .entry(metadata.category_id.clone())
                    .or_default()
                    .push(metadata);
            }
        }

        categories
            .iter()
            .map(|category| CategoryWithBuilders {
                category: Category::clone(category),
                builders: by_category.remove(&category.id).unwrap_or_default(),
            })
            .collect()
    }

    // ----- fragments -----

    /// Register the factory for a fragment type.
    ///
    /// The factory is called once to check it produces the declared type.
    pub fn register_fragment<F>(&self, fragment_type: FragmentType, factory: F) -> TagResult<()>
    where
        F: Fn() -> Fragment + Send + Sync + 'static,
    {
        let produced = factory().fragment_type();
        if produced != fragment_type {
            return Err(TagError::FragmentTypeMismatch {
                expected: fragment_type.to_string(),
                got: produced.to_string(),
            });
        }

        let mut inner = self.inner.write();
        if inner.fragments.contains_key(&fragment_type) {
            return Err(TagError::duplicate("fragment", fragment_type.as_str()));
        }
        inner.fragments.insert(fragment_type, Arc::new(factory));
        Ok(())
    }

    /// Panics on failure. Startup wiring only.
    pub fn must_register_fragment<F>(&self, fragment_type: FragmentType, factory: F)
    where
        F: Fn() -> Fragment + Send + Sync + 'static,
    {
        if let Err(e) = self.register_fragment(fragment_type, factory) {
            panic!("{e}");
        }
    }

    pub fn get_fragment_factory(&self, fragment_type: FragmentType) -> Option<FragmentFactory> {
        self.inner.read().fragments.get(&fragment_type).cloned()
    }

    /// A fresh fragment of the given type from its registered factory.
    pub fn create_fragment(&self, fragment_type: FragmentType) -> TagResult<Fragment> {
        let factory = self
            .get_fragment_factory(fragment_type)
            .ok_or_else(|| TagError::UnknownFragmentType(fragment_type.to_string()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Registry")
            .field("categories", &inner.categories.len())
            .field("builders", &inner.builders.len())
            .field("fragments", &inner.fragments.len())
            .finish()
    }
}

/// Register the empty-prototype factory for every standard fragment type.
///
/// Types that already have a factory are left alone.
pub fn register_standard_fragments(registry: &Registry) {
    for fragment_type in FragmentType::ALL {
        if registry.get_fragment_factory(fragment_type).is_some() {
            continue;
        }
        let factory = move || Fragment::empty(fragment_type);
        if let Err(e) = registry.register_fragment(fragment_type, factory) {
            tracing::warn!("standard fragment {} not registered: {}", fragment_type, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::TextFragment;

    fn builder(id: &str, category: &str) -> BuilderKind {
        BuilderKind::descriptive(Metadata::new(id, id).category(category))
    }

    #[test]
    fn test_register_category_twice_fails() {
        let registry = Registry::new();
        registry
            .register_category(Category::new("demographics", "Demographics"))
            .unwrap();
        let err = registry
            .register_category(Category::new("demographics", "Again"))
            .unwrap_err();
        assert!(matches!(err, TagError::DuplicateId { kind: "category", .. }));
        assert_eq!(registry.get_categories().len(), 1);
        assert_eq!(registry.must_get_category("demographics").name, "Demographics");
    }

    #[test]
    fn test_builder_requires_registered_category() {
        let registry = Registry::new();
        let err = registry.register_builder(builder("age", "demographics")).unwrap_err();
        assert!(matches!(err, TagError::UnknownCategory(c) if c == "demographics"));
        assert!(registry.get_builder("age").is_none());

        registry
            .register_category(Category::new("demographics", "Demographics"))
            .unwrap();
        registry.register_builder(builder("age", "demographics")).unwrap();
        assert!(registry.get_builder("age").is_some());

        let err = registry.register_builder(builder("age", "demographics")).unwrap_err();
        assert!(matches!(err, TagError::DuplicateId { kind: "builder", .. }));
    }

    #[test]
    fn test_uncategorized_builder_is_allowed() {
        let registry = Registry::new();
        registry.register_builder(builder("loose", "")).unwrap();
        assert!(registry.get_builder("loose").is_some());
        assert!(registry.get_categories_with_builders(&Context::background()).is_empty());
    }

    #[test]
    fn test_categories_with_builders_order() {
        let registry = Registry::new();
        registry.must_register_category(Category::new("demographics", "Demographics"));
        registry.must_register_category(Category::new("activities", "Activities"));
        registry.must_register_category(Category::new("empty", "Empty"));
        registry.must_register_builder(builder("purchase", "activities"));
        registry.must_register_builder(builder("gender", "demographics"));
        registry.must_register_builder(builder("age", "demographics"));

        let groups = registry.get_categories_with_builders(&Context::background());
        let shape: Vec<(String, Vec<String>)> = groups
            .iter()
            .map(|g| {
                (
                    g.category.id.clone(),
                    g.builders.iter().map(|b| b.id.clone()).collect(),
                )
            })
            .collect();
        assert_eq!(
            shape,
            vec![
                ("demographics".to_string(), vec!["gender".to_string(), "age".to_string()]),
                ("activities".to_string(), vec!["purchase".to_string()]),
                ("empty".to_string(), vec![]),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "builder with ID \"nope\" not found")]
    fn test_must_get_builder_panics() {
        Registry::new().must_get_builder("nope");
    }

    #[test]
    fn test_register_fragment_checks() {
        let registry = Registry::new();
        let err = registry
            .register_fragment(FragmentType::Select, || TextFragment::new("x").into())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "fragment type mismatch: expected SELECT, got TEXT"
        );

        registry
            .register_fragment(FragmentType::Text, || TextFragment::new("x").into())
            .unwrap();
        let err = registry
            .register_fragment(FragmentType::Text, || TextFragment::new("y").into())
            .unwrap_err();
        assert!(matches!(err, TagError::DuplicateId { kind: "fragment", .. }));

        let created = registry.create_fragment(FragmentType::Text).unwrap();
        assert_eq!(created, Fragment::Text(TextFragment::new("x")));
        assert!(registry.create_fragment(FragmentType::Hidden).is_err());
    }

    #[test]
    fn test_standard_registry_has_all_factories() {
        let registry = Registry::standard();
        for t in FragmentType::ALL {
            assert_eq!(registry.create_fragment(t).unwrap().fragment_type(), t);
        }
    }
}
