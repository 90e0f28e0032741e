//! # Identifier Allocator
//!
//! Assigns every emitted type and member a unique, stable source identifier.
//!
//! ## Collision domain
//!
//! Identifiers are unique across a module's whole output unit, not just
//! within a namespace. With namespace truncation enabled every reference is
//! written unqualified, so two types that only differ by namespace would
//! otherwise become ambiguous. Collision *detection* still works on canonical
//! keys: two identical short names only collide if they belong to distinct
//! keys.
//!
//! ## Suffix policy
//!
//! Colliding keys are sorted by canonical key and numbered from 1
//! (`Foo_1`, `Foo_2`, ...), skipping any number whose result is already taken.
//! Discovery order never matters, so the same input always produces the same
//! names.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::error::{ExportError, TypeforgeResult};
use crate::model::{ResolvedGraph, TemplateInstance, TypeId, TypeInstance, TypeKey};

/// Identifier given to function signature types before disambiguation.
pub const FUNCTION_IDENTIFIER: &str = "Function";

/// Emitted name of one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedName
{
    /// Sanitized namespace segments, outermost first
    pub namespace: Vec<String>,
    /// Unique identifier within the module's output
    pub identifier: String,
}

/// Names assigned to one module's declarations and their members.
#[derive(Debug, Clone, Default)]
pub struct NameTable
{
    types: HashMap<TypeId, AssignedName>,
    members: HashMap<TypeId, Vec<String>>,
    bases: HashMap<TypeId, Vec<String>>,
}

impl NameTable
{
    /// Name of a declaration, `None` if the type is not emitted.
    #[must_use]
    pub fn type_name(&self, id: TypeId) -> Option<&AssignedName>
    {
        self.types.get(&id)
    }

    /// Identifier of a declaration, `None` if the type is not emitted.
    #[must_use]
    pub fn identifier(&self, id: TypeId) -> Option<&str>
    {
        self.types.get(&id).map(|name| name.identifier.as_str())
    }

    /// Field identifiers of an aggregate, or member identifiers of an enum,
    /// parallel to the instance's own list.
    #[must_use]
    pub fn members(&self, id: TypeId) -> &[String]
    {
        self.members.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Base accessor identifiers of an aggregate, parallel to its bases.
    #[must_use]
    pub fn bases(&self, id: TypeId) -> &[String]
    {
        self.bases.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Number of named declarations.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }
}

/// Assign identifiers to every declarable, non-excluded type of a graph.
///
/// `reserved` are words the target language forbids as identifiers; a
/// sanitized name equal to one of them gets a trailing `_`.
///
/// ## Errors
///
/// `IdentifierCollisionUnresolvable` if the final uniqueness check fails.
/// That indicates a bug in this module, never bad input.
pub fn allocate(graph: &ResolvedGraph, reserved: &[&str]) -> TypeforgeResult<NameTable>
{
    let reserved: HashSet<&str> = reserved.iter().copied().collect();
    let mut table = NameTable::default();

    // Group by natural identifier; BTreeMap + sorted ids keep everything in canonical order.
    let mut groups: BTreeMap<String, Vec<TypeId>> = BTreeMap::new();
    let mut namespaces: HashMap<TypeId, Vec<String>> = HashMap::new();
    for id in graph.ids_by_key() {
        let instance = graph.get(id);
        if !instance.is_declarable() || graph.is_illegal(id) {
            continue;
        }
        let (namespace, natural) = natural_name(graph, id);
        let identifier = escape_reserved(sanitize_identifier(&natural, "Anonymous"), &reserved);
        namespaces.insert(
            id,
            namespace
                .iter()
                .map(|segment| escape_reserved(sanitize_identifier(segment, "ns"), &reserved))
                .collect(),
        );
        groups.entry(identifier).or_default().push(id);
    }

    let mut taken: HashSet<String> = groups
        .iter()
        .filter(|(_, ids)| ids.len() == 1)
        .map(|(identifier, _)| identifier.clone())
        .collect();

    let mut assigned: Vec<(TypeId, String)> = Vec::new();
    for (identifier, ids) in &groups {
        if ids.len() == 1 {
            assigned.push((ids[0], identifier.clone()));
            continue;
        }
        debug!(identifier = %identifier, count = ids.len(), "Disambiguating colliding identifiers");
        let mut counter = 1usize;
        for id in ids {
            let candidate = loop {
                let candidate = format!("{identifier}_{counter}");
                counter += 1;
                if !taken.contains(&candidate) && !groups.contains_key(&candidate) {
                    break candidate;
                }
            };
            taken.insert(candidate.clone());
            assigned.push((*id, candidate));
        }
    }

    let mut owners: HashMap<&str, TypeId> = HashMap::new();
    for (id, identifier) in &assigned {
        if let Some(previous) = owners.insert(identifier.as_str(), *id) {
            return Err(ExportError::IdentifierCollisionUnresolvable {
                module: graph.module().to_string(),
                identifier: identifier.clone(),
                first: graph.key(previous).to_string(),
                second: graph.key(*id).to_string(),
            });
        }
    }

    // Namespaces and types share one scope in both target languages.
    let lowered: HashSet<String> = assigned.iter().map(|(_, identifier)| identifier.to_ascii_lowercase()).collect();
    for (id, identifier) in assigned {
        let namespace = namespaces
            .remove(&id)
            .unwrap_or_default()
            .into_iter()
            .map(|segment| {
                if lowered.contains(&segment.to_ascii_lowercase()) {
                    format!("{segment}_ns")
                } else {
                    segment
                }
            })
            .collect();
        assign_members(graph, id, &identifier, &reserved, &mut table);
        table.types.insert(id, AssignedName { namespace, identifier });
    }
    Ok(table)
}

fn assign_members(graph: &ResolvedGraph, id: TypeId, owner: &str, reserved: &HashSet<&str>, table: &mut NameTable)
{
    match graph.get(id) {
        TypeInstance::Aggregate(user) | TypeInstance::TemplateInstance(TemplateInstance { layout: user, .. }) => {
            let mut scope = MemberScope::new(reserved);
            // The owner's own name is off limits (C# members cannot share it).
            scope.reserve(owner);
            let bases = user
                .bases
                .iter()
                .map(|base| {
                    let natural = format!("as_{}", natural_name(graph, *base).1);
                    scope.claim(&natural, "as_base")
                })
                .collect();
            let members = user
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| scope.claim(&field.name, &format!("field_{index}")))
                .collect();
            table.bases.insert(id, bases);
            table.members.insert(id, members);
        }
        TypeInstance::Enum(enumeration) => {
            let mut scope = MemberScope::new(reserved);
            scope.reserve(owner);
            let members = enumeration
                .members
                .iter()
                .enumerate()
                .map(|(index, member)| scope.claim(&member.name, &format!("Value{index}")))
                .collect();
            table.members.insert(id, members);
        }
        _ => {}
    }
}

/// Unique identifiers within one type.
struct MemberScope<'a>
{
    reserved: &'a HashSet<&'a str>,
    used: HashSet<String>,
}

impl<'a> MemberScope<'a>
{
    fn new(reserved: &'a HashSet<&'a str>) -> Self
    {
        Self {
            reserved,
            used: HashSet::new(),
        }
    }

    fn reserve(&mut self, name: &str)
    {
        self.used.insert(name.to_string());
    }

    fn claim(&mut self, raw: &str, fallback: &str) -> String
    {
        let base = escape_reserved(sanitize_identifier(raw, fallback), self.reserved);
        let mut candidate = base.clone();
        let mut counter = 1usize;
        while self.used.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Namespace and unsanitized short name a declaration would like to have.
fn natural_name(graph: &ResolvedGraph, id: TypeId) -> (Vec<String>, String)
{
    match graph.get(id) {
        TypeInstance::Aggregate(user) => (user.namespace.clone(), user.name.clone()),
        TypeInstance::Enum(enumeration) => (enumeration.namespace.clone(), enumeration.name.clone()),
        TypeInstance::TemplateInstance(template) => {
            let mut name = template.base_name().to_string();
            for argument in &template.type_arguments {
                name.push('_');
                name.push_str(&argument_token(graph.key(*argument)));
            }
            (template.layout.namespace.clone(), name)
        }
        TypeInstance::Function(_) => (Vec::new(), FUNCTION_IDENTIFIER.to_string()),
        TypeInstance::Undefined { name } => (Vec::new(), name.clone()),
        TypeInstance::Primitive(kind) => (Vec::new(), kind.token().to_string()),
        TypeInstance::Pointer { .. } | TypeInstance::Array { .. } => (Vec::new(), "Anonymous".to_string()),
    }
}

/// Compact token for a template argument inside an identifier.
fn argument_token(key: &TypeKey) -> String
{
    match key {
        TypeKey::Primitive(kind) => kind.token().to_string(),
        TypeKey::Named { name, arguments, .. } => {
            let (_, short) = split_qualified(name);
            let mut token = short;
            for argument in arguments {
                token.push('_');
                token.push_str(&argument_token(argument));
            }
            token
        }
        TypeKey::Pointer(inner) => format!("{}_ptr", argument_token(inner)),
        TypeKey::Array { element, length } => match length {
            Some(length) => format!("{}_array{length}", argument_token(element)),
            None => format!("{}_array", argument_token(element)),
        },
        TypeKey::Function { .. } => "fn".to_string(),
        TypeKey::Opaque { .. } | TypeKey::Truncated { .. } => "opaque".to_string(),
    }
}

/// Turn arbitrary text into an identifier.
///
/// Every run of characters outside `[A-Za-z0-9_]` becomes a single `_`,
/// leading and trailing underscores introduced that way are trimmed, and a
/// leading digit gets a `_` prefix. An empty result becomes `fallback`.
#[must_use]
pub fn sanitize_identifier(raw: &str, fallback: &str) -> String
{
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_separator && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        return fallback.to_string();
    }
    if out.starts_with(|ch: char| ch.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn escape_reserved(identifier: String, reserved: &HashSet<&str>) -> String
{
    if reserved.contains(identifier.as_str()) {
        format!("{identifier}_")
    } else {
        identifier
    }
}

/// Split `a::b<c::d>::Name` into (`[a, b<c::d>]`, `Name`).
///
/// Separators inside angle brackets or parentheses are not split on, so
/// template argument lists stay intact.
#[must_use]
pub fn split_qualified(name: &str) -> (Vec<String>, String)
{
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let bytes = name.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'<' | b'(' => depth += 1,
            b'>' | b')' => depth -= 1,
            b':' if depth == 0 && bytes.get(index + 1) == Some(&b':') => {
                segments.push(name[start..index].to_string());
                index += 2;
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    let short = name[start..].to_string();
    segments.retain(|segment| !segment.is_empty());
    (segments, short)
}

/// Drop a trailing template argument list: `std::vector<int>` becomes `std::vector`.
#[must_use]
pub fn strip_template_arguments(name: &str) -> &str
{
    let trimmed = name.trim_end();
    if !trimmed.ends_with('>') {
        return trimmed;
    }
    let mut depth = 0i32;
    for (index, ch) in trimmed.char_indices().rev() {
        match ch {
            '>' => depth += 1,
            '<' => {
                depth -= 1;
                if depth == 0 {
                    return trimmed[..index].trim_end();
                }
            }
            _ => {}
        }
    }
    trimmed
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_sanitize_identifier()
    {
        assert_eq!(sanitize_identifier("Foo", "x"), "Foo");
        assert_eq!(sanitize_identifier("vector<int>", "x"), "vector_int");
        assert_eq!(sanitize_identifier("(anonymous namespace)", "x"), "anonymous_namespace");
        assert_eq!(sanitize_identifier("3d", "x"), "_3d");
        assert_eq!(sanitize_identifier("", "fallback"), "fallback");
        assert_eq!(sanitize_identifier("<>", "fallback"), "fallback");
        assert_eq!(sanitize_identifier("__m128", "x"), "__m128");
    }

    #[test]
    fn test_split_qualified()
    {
        assert_eq!(split_qualified("Node"), (Vec::new(), "Node".to_string()));
        assert_eq!(
            split_qualified("a::b::Node"),
            (vec!["a".to_string(), "b".to_string()], "Node".to_string())
        );
        assert_eq!(
            split_qualified("std::map<std::string, int>::node"),
            (vec!["std".to_string(), "map<std::string, int>".to_string()], "node".to_string())
        );
        assert_eq!(split_qualified("::Global"), (Vec::new(), "Global".to_string()));
    }

    #[test]
    fn test_strip_template_arguments()
    {
        assert_eq!(strip_template_arguments("std::vector<int>"), "std::vector");
        assert_eq!(
            strip_template_arguments("std::map<std::string, std::vector<int> >"),
            "std::map"
        );
        assert_eq!(strip_template_arguments("Plain"), "Plain");
        assert_eq!(strip_template_arguments("operator>"), "operator>");
    }

    #[test]
    fn test_member_scope_dedups()
    {
        let reserved: HashSet<&str> = ["type"].into_iter().collect();
        let mut scope = MemberScope::new(&reserved);
        scope.reserve("Owner");
        assert_eq!(scope.claim("value", "f0"), "value");
        assert_eq!(scope.claim("value", "f1"), "value_1");
        assert_eq!(scope.claim("", "field_2"), "field_2");
        assert_eq!(scope.claim("type", "f3"), "type_");
        assert_eq!(scope.claim("Owner", "f4"), "Owner_1");
    }
}
