//! Two-phase definition building.
//!
//! Embedded object definitions may refer to each other (and to themselves)
//! by name. Names are declared first, bodies defined afterwards, and every
//! name reference is checked once at `finish`. The result is a name-indexed
//! table that validation threads explicitly instead of a global registry.

use crate::model::{PropertyDefinition, PropertyKind, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///
/// ObjectDefinition
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ObjectDefinition {
    pub name: String,
    pub properties: Vec<PropertyDefinition>,
}

impl ObjectDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }
}

///
/// Definitions
/// Resolved, name-indexed embedded object definitions.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Definitions(BTreeMap<String, ObjectDefinition>);

impl Definitions {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ObjectDefinition> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.0.values()
    }
}

///
/// DefinitionsContext
///

#[derive(Debug, Default)]
pub struct DefinitionsContext {
    declared: BTreeSet<String>,
    defined: BTreeMap<String, ObjectDefinition>,
}

impl DefinitionsContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name so bodies defined later may reference it.
    pub fn declare(&mut self, name: impl Into<String>) -> Result<(), SchemaError> {
        let name = name.into();
        if !self.declared.insert(name.clone()) {
            return Err(SchemaError::DuplicateDefinition { name });
        }

        Ok(())
    }

    /// Supply the body of a previously declared name.
    pub fn define(&mut self, definition: ObjectDefinition) -> Result<(), SchemaError> {
        if !self.declared.contains(&definition.name) {
            return Err(SchemaError::UndeclaredDefinition {
                name: definition.name,
            });
        }
        if self.defined.contains_key(&definition.name) {
            return Err(SchemaError::DuplicateDefinition {
                name: definition.name,
            });
        }
        check_unique_names(&definition.name, &definition.properties)?;

        self.defined.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Resolve every forward reference and freeze the table.
    pub fn finish(self) -> Result<Definitions, SchemaError> {
        if let Some(name) = self
            .declared
            .iter()
            .find(|name| !self.defined.contains_key(*name))
        {
            return Err(SchemaError::MissingDefinition { name: name.clone() });
        }

        for definition in self.defined.values() {
            for property in &definition.properties {
                check_references(&property.kind, &self.declared)?;
            }
        }

        Ok(Definitions(self.defined))
    }
}

pub(crate) fn check_unique_names(
    owner: &str,
    properties: &[PropertyDefinition],
) -> Result<(), SchemaError> {
    let mut seen = BTreeSet::new();
    for property in properties {
        if !seen.insert(property.name.as_str()) {
            return Err(SchemaError::DuplicateProperty {
                owner: owner.to_string(),
                name: property.name.clone(),
            });
        }
    }

    Ok(())
}

/// Every `Embed` name inside `kind` must be known.
pub(crate) fn check_references(
    kind: &PropertyKind,
    known: &BTreeSet<String>,
) -> Result<(), SchemaError> {
    match kind {
        PropertyKind::Embed(name) if !known.contains(name) => {
            Err(SchemaError::UnresolvedReference { name: name.clone() })
        }
        PropertyKind::List { item, .. } | PropertyKind::Set { item, .. } => {
            check_references(item, known)
        }
        PropertyKind::Map { key, value, .. } => {
            check_references(key, known)?;
            check_references(value, known)
        }
        PropertyKind::IncMap { value, .. } => check_references(value, known),
        PropertyKind::MultiType(arms) => arms
            .iter()
            .try_for_each(|(_, arm)| check_references(arm, known)),
        _ => Ok(()),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_referencing_definitions_resolve() {
        let mut ctx = DefinitionsContext::new();
        ctx.declare("Node").unwrap();
        ctx.define(
            ObjectDefinition::new("Node")
                .property(PropertyDefinition::new("label", PropertyKind::text()))
                .property(PropertyDefinition::new(
                    "children",
                    PropertyKind::list(PropertyKind::embed("Node")),
                )),
        )
        .unwrap();

        let definitions = ctx.finish().unwrap();
        assert!(definitions.contains("Node"));
    }

    #[test]
    fn forward_references_resolve_once_declared() {
        let mut ctx = DefinitionsContext::new();
        ctx.declare("Person").unwrap();
        ctx.declare("Address").unwrap();
        ctx.define(
            ObjectDefinition::new("Person")
                .property(PropertyDefinition::new("home", PropertyKind::embed("Address"))),
        )
        .unwrap();
        ctx.define(
            ObjectDefinition::new("Address")
                .property(PropertyDefinition::new("city", PropertyKind::text())),
        )
        .unwrap();

        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn unresolved_and_missing_names_fail_at_finish() {
        let mut ctx = DefinitionsContext::new();
        ctx.declare("A").unwrap();
        ctx.define(
            ObjectDefinition::new("A")
                .property(PropertyDefinition::new("b", PropertyKind::embed("B"))),
        )
        .unwrap();
        assert_eq!(
            ctx.finish().unwrap_err(),
            SchemaError::UnresolvedReference { name: "B".into() }
        );

        let mut ctx = DefinitionsContext::new();
        ctx.declare("Ghost").unwrap();
        assert_eq!(
            ctx.finish().unwrap_err(),
            SchemaError::MissingDefinition {
                name: "Ghost".into()
            }
        );
    }

    #[test]
    fn define_requires_declaration() {
        let mut ctx = DefinitionsContext::new();
        let err = ctx.define(ObjectDefinition::new("Loose")).unwrap_err();

        assert_eq!(
            err,
            SchemaError::UndeclaredDefinition {
                name: "Loose".into()
            }
        );
    }
}
