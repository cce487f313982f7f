//! Context building: joins a unit's method surface with the mocks it can use.

use std::collections::HashSet;

use tc_core::types::{dependency_type, unqualified};
use tc_core::{Access, GenerationContext, GenerationOptions, MethodSignature, MockBinding, SourceUnit};
use tc_mocks::MockCatalog;
use tracing::debug;

/// Builds a [`GenerationContext`] from a unit, the catalog and options.
pub struct ContextBuilder;

impl ContextBuilder {
    /// Pure function of its inputs; nothing is mutated.
    pub fn build(
        unit: &SourceUnit,
        catalog: &MockCatalog,
        options: &GenerationOptions,
    ) -> GenerationContext {
        let methods: Vec<MethodSignature> = unit
            .signatures
            .iter()
            .filter(|s| Self::selected(s.access, options))
            .cloned()
            .collect();

        let mut mocks: Vec<MockBinding> = Vec::new();
        let mut unmocked = Vec::new();
        for dependency in Self::dependency_types(unit, &methods) {
            let binding = catalog
                .find(&dependency)
                .or_else(|| catalog.find(unqualified(&dependency)));
            match binding {
                Some(binding) => {
                    if !mocks.iter().any(|m| m.path == binding.path) {
                        mocks.push(binding.clone());
                    }
                }
                None => unmocked.push(dependency),
            }
        }

        debug!(
            class = %unit.class_name,
            methods = methods.len(),
            mocks = mocks.len(),
            unmocked = unmocked.len(),
            "built generation context"
        );

        GenerationContext {
            unit: unit.clone(),
            methods,
            mocks,
            unmocked,
            options: options.clone(),
        }
    }

    fn selected(access: Access, options: &GenerationOptions) -> bool {
        match access {
            Access::Public => true,
            Access::Protected => options.include_protected,
            Access::Private => options.include_private,
        }
    }

    /// Distinct dependency types in first-seen order: selected method
    /// returns and parameters, then the unit's collaborators.
    fn dependency_types(unit: &SourceUnit, methods: &[MethodSignature]) -> Vec<String> {
        let written = methods
            .iter()
            .flat_map(|m| std::iter::once(m.return_type.as_str()).chain(m.parameter_types()))
            .chain(unit.collaborators.iter().map(String::as_str));

        let mut seen = HashSet::new();
        written
            .filter_map(dependency_type)
            .filter(|ty| unqualified(ty) != unit.class_name)
            .filter(|ty| seen.insert(ty.clone()))
            .collect()
    }
}
