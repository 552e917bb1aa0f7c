use crate::errors::{LayoutError, LayoutResult};
use crate::primitive::PrimitiveType;
use crate::record::{MemberType, RecordBuilder, RecordMetadata};
use indexmap::IndexMap;
use std::sync::Arc;
use struct_types::{LayoutFile, RecordDecl};
use tracing::{debug, trace};

/// Table of finalized record types keyed by name.
///
/// Declarations can be added in any order; [`TypeRegistry::resolve_all`]
/// builds them once everything they reference is available.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    records: IndexMap<String, Arc<RecordMetadata>>,
    pending: IndexMap<String, RecordDecl>,
}

enum BuildOutcome {
    Built(Arc<RecordMetadata>),
    Waiting(String),
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a declaration; a name already queued or registered is an error.
    pub fn add_decl(&mut self, decl: RecordDecl) -> LayoutResult<()> {
        if self.pending.contains_key(&decl.name) || self.records.contains_key(&decl.name) {
            return Err(LayoutError::DuplicateRecord { name: decl.name });
        }
        self.pending.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn add_file(&mut self, file: LayoutFile) -> LayoutResult<()> {
        for decl in file.records {
            self.add_decl(decl)?;
        }
        Ok(())
    }

    /// Finalizes a programmatic declaration and registers it.
    pub fn declare(&mut self, builder: RecordBuilder) -> LayoutResult<Arc<RecordMetadata>> {
        let meta = builder.finish()?;
        self.insert(Arc::clone(&meta))?;
        Ok(meta)
    }

    pub fn insert(&mut self, meta: Arc<RecordMetadata>) -> LayoutResult<()> {
        let name = meta.name().to_string();
        if PrimitiveType::find(&name).is_some() {
            return Err(LayoutError::invalid_type(name));
        }
        if self.records.contains_key(&name) {
            return Err(LayoutError::DuplicateRecord { name });
        }
        self.records.insert(name, meta);
        Ok(())
    }

    /// Builds every pending declaration in dependency order.
    pub fn resolve_all(&mut self) -> LayoutResult<()> {
        while !self.pending.is_empty() {
            let mut progressed = false;
            let mut missing = Vec::new();

            for name in self.pending.keys().cloned().collect::<Vec<_>>() {
                let Some(decl) = self.pending.get(&name) else {
                    continue;
                };
                match self.build_decl(decl)? {
                    BuildOutcome::Built(meta) => {
                        trace!(record = %name, "resolved declaration");
                        self.pending.shift_remove(&name);
                        self.insert(meta)?;
                        progressed = true;
                    }
                    BuildOutcome::Waiting(dependency) => {
                        if !self.pending.contains_key(&dependency) {
                            missing.push(dependency);
                        }
                    }
                }
            }

            if !progressed {
                if let Some(type_name) = missing.into_iter().next() {
                    return Err(LayoutError::InvalidType { type_name });
                }
                let cycle: Vec<String> = self.pending.keys().cloned().collect();
                return Err(LayoutError::CircularDependency(cycle));
            }
        }

        debug!(records = self.records.len(), "type registry resolved");
        Ok(())
    }

    fn build_decl(&self, decl: &RecordDecl) -> LayoutResult<BuildOutcome> {
        if let Some(dependency) = decl
            .dependencies()
            .find(|dep| PrimitiveType::find(dep).is_none() && !self.records.contains_key(*dep))
        {
            return Ok(BuildOutcome::Waiting(dependency.to_string()));
        }

        let mut builder = RecordBuilder::new(&decl.name).options(decl.options.clone());
        if let Some(base) = &decl.extends {
            builder = builder.extends(self.record(base)?);
        }
        for member in &decl.members {
            let ty = self.resolve_type(&member.type_name)?;
            builder = builder.member(&member.name, ty, member.length.clone());
        }
        builder.finish().map(BuildOutcome::Built)
    }

    /// Resolves a type name to a primitive or a registered record.
    pub fn resolve_type(&self, name: &str) -> LayoutResult<MemberType> {
        if let Some(prim) = PrimitiveType::find(name) {
            return Ok(MemberType::Primitive(prim));
        }
        self.record(name).map(MemberType::from)
    }

    /// Registered record named `name`.
    pub fn record(&self, name: &str) -> LayoutResult<&Arc<RecordMetadata>> {
        self.records
            .get(name)
            .ok_or_else(|| LayoutError::invalid_type(name))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RecordMetadata>> {
        self.records.get(name)
    }

    /// Registered records in the order they were finalized.
    pub fn records(&self) -> impl Iterator<Item = &Arc<RecordMetadata>> {
        self.records.values()
    }

    pub fn is_resolved(&self) -> bool {
        self.pending.is_empty()
    }
}

impl TryFrom<LayoutFile> for TypeRegistry {
    type Error = LayoutError;

    fn try_from(file: LayoutFile) -> LayoutResult<Self> {
        let mut registry = TypeRegistry::new();
        registry.add_file(file)?;
        registry.resolve_all()?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use struct_types::MemberDecl;

    fn decl(name: &str, members: Vec<MemberDecl>) -> RecordDecl {
        RecordDecl {
            name: name.to_string(),
            extends: None,
            options: Default::default(),
            members,
        }
    }

    #[test]
    fn resolves_out_of_order_declarations() {
        let mut registry = TypeRegistry::new();
        registry
            .add_decl(decl(
                "Outer",
                vec![
                    MemberDecl::scalar("inner", "Inner"),
                    MemberDecl::array("more", "Inner", 2),
                ],
            ))
            .unwrap();
        registry.add_decl(decl("Inner", vec![MemberDecl::scalar("v", "Uint32")])).unwrap();
        registry.resolve_all().unwrap();

        assert!(registry.is_resolved());
        assert_eq!(registry.record("Outer").unwrap().static_size(), 12);
        let names: Vec<&str> = registry.records().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Inner", "Outer"]);
    }

    #[test]
    fn missing_type_is_invalid() {
        let mut registry = TypeRegistry::new();
        registry.add_decl(decl("Outer", vec![MemberDecl::scalar("x", "Nowhere")])).unwrap();
        assert_eq!(
            registry.resolve_all(),
            Err(LayoutError::InvalidType {
                type_name: "Nowhere".to_string()
            })
        );
    }

    #[test]
    fn cycles_are_reported() {
        let mut registry = TypeRegistry::new();
        registry.add_decl(decl("A", vec![MemberDecl::scalar("b", "B")])).unwrap();
        registry.add_decl(decl("B", vec![MemberDecl::scalar("a", "A")])).unwrap();
        assert!(matches!(
            registry.resolve_all(),
            Err(LayoutError::CircularDependency(names)) if names.len() == 2
        ));
    }

    #[test]
    fn declaration_errors_surface_at_resolution() {
        let mut registry = TypeRegistry::new();
        registry
            .add_decl(decl(
                "Bad",
                vec![MemberDecl::counted_by("items", "u8", "count")],
            ))
            .unwrap();
        assert!(matches!(
            registry.resolve_all(),
            Err(LayoutError::InvalidCountField { .. })
        ));
    }

    #[test]
    fn extends_and_programmatic_records() {
        let mut registry = TypeRegistry::new();
        registry
            .declare(RecordBuilder::new("Base").field("id", PrimitiveType::Uint64))
            .unwrap();
        registry
            .add_decl(RecordDecl {
                extends: Some("Base".to_string()),
                ..decl("Child", vec![MemberDecl::scalar("flag", "u8")])
            })
            .unwrap();
        registry.resolve_all().unwrap();

        let child = registry.record("Child").unwrap();
        assert_eq!(child.static_size(), 9);
        assert_eq!(child.member("flag").unwrap().static_offset, 8);
        assert!(child.is_a(registry.record("Base").unwrap()));

        assert!(matches!(
            registry.declare(RecordBuilder::new("Base")),
            Err(LayoutError::DuplicateRecord { .. })
        ));
        assert!(matches!(
            registry.declare(RecordBuilder::new("u8")),
            Err(LayoutError::InvalidType { .. })
        ));
        assert!(matches!(
            registry.resolve_type("float"),
            Ok(MemberType::Primitive(PrimitiveType::Float32))
        ));
    }

    #[test]
    fn loads_yaml_file() {
        let yaml = r#"
records:
  - name: Header
    members:
      - { name: magic, type: char, length: 4 }
      - { name: count, type: uint16 }
      - { name: end, type: char, length: 4 }
"#;
        let file: LayoutFile = serde_yml::from_str(yaml).unwrap();
        let registry = TypeRegistry::try_from(file).unwrap();
        assert_eq!(registry.record("Header").unwrap().static_size(), 10);
    }

    #[test]
    fn redeclared_records_are_rejected() {
        let yaml = r#"
records:
  - name: A
    members:
      - { name: x, type: u8 }
  - name: A
    members:
      - { name: y, type: u64 }
"#;
        let file: LayoutFile = serde_yml::from_str(yaml).unwrap();
        assert_eq!(
            TypeRegistry::try_from(file).err(),
            Some(LayoutError::DuplicateRecord {
                name: "A".to_string()
            })
        );

        /* Across files: the second file names a record already built */
        let mut registry = TypeRegistry::new();
        registry
            .declare(RecordBuilder::new("A").field("x", PrimitiveType::Uint8))
            .unwrap();
        assert!(matches!(
            registry.add_decl(decl("A", vec![MemberDecl::scalar("y", "u64")])),
            Err(LayoutError::DuplicateRecord { .. })
        ));
        assert_eq!(registry.record("A").unwrap().static_size(), 1);
    }
}
