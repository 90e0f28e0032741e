//! Type-string rendering.
//!
//! [`ResolvedGraph::render_type_string`] walks an instance and composes its
//! source-level name; a [`TypeSyntax`] supplies the tokens. The model ships
//! [`DisplaySyntax`] for diagnostics and tests; every code writer brings its
//! own syntax so the same walk produces Rust or C# type names.

use super::graph::ResolvedGraph;
use super::instance::{TypeId, TypeInstance};
use super::primitive::PrimitiveKind;

/// Marker rendered for `Undefined` instances.
///
/// Names the runtime's dynamic value type, which can still be inspected
/// member by member at execution time.
pub const UNDEFINED_MARKER: &str = "Variable";

/// Token source for [`ResolvedGraph::render_type_string`].
pub trait TypeSyntax
{
    /// Token for a built-in scalar.
    fn primitive(&self, kind: PrimitiveKind) -> String;

    /// Wrap an already rendered pointee.
    fn pointer(&self, pointee: &str) -> String;

    /// Wrap an already rendered element type.
    fn array(&self, element: &str, length: Option<u64>) -> String;

    /// Render a function signature from its rendered components.
    fn function(&self, graph: &ResolvedGraph, id: TypeId, return_type: &str, parameters: &[String]) -> String;

    /// Name of an aggregate, enum or template instance.
    ///
    /// `None` means the type has no usable name (it was excluded from
    /// output) and the undefined marker is rendered instead.
    fn named(&self, graph: &ResolvedGraph, id: TypeId, truncate_namespace: bool) -> Option<String>;

    /// Marker for undefined types.
    fn undefined(&self) -> &str
    {
        UNDEFINED_MARKER
    }
}

/// Plain, C-like rendering with fully qualified names.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplaySyntax;

impl TypeSyntax for DisplaySyntax
{
    fn primitive(&self, kind: PrimitiveKind) -> String
    {
        kind.token().to_string()
    }

    fn pointer(&self, pointee: &str) -> String
    {
        format!("{pointee}*")
    }

    fn array(&self, element: &str, length: Option<u64>) -> String
    {
        match length {
            Some(length) => format!("{element}[{length}]"),
            None => format!("{element}[]"),
        }
    }

    fn function(&self, _graph: &ResolvedGraph, _id: TypeId, return_type: &str, parameters: &[String]) -> String
    {
        format!("{return_type}({})", parameters.join(", "))
    }

    fn named(&self, graph: &ResolvedGraph, id: TypeId, truncate_namespace: bool) -> Option<String>
    {
        let qualified = |namespace: &[String], name: &str| {
            if truncate_namespace || namespace.is_empty() {
                name.to_string()
            } else {
                format!("{}::{name}", namespace.join("::"))
            }
        };
        match graph.get(id) {
            TypeInstance::Aggregate(user) => Some(qualified(&user.namespace, &user.name)),
            TypeInstance::Enum(enumeration) => Some(qualified(&enumeration.namespace, &enumeration.name)),
            TypeInstance::TemplateInstance(template) => {
                let arguments: Vec<String> = template
                    .type_arguments
                    .iter()
                    .map(|argument| graph.render_type_string(*argument, self, truncate_namespace))
                    .collect();
                Some(format!(
                    "{}<{}>",
                    qualified(&template.layout.namespace, template.base_name()),
                    arguments.join(", ")
                ))
            }
            _ => None,
        }
    }
}

impl ResolvedGraph
{
    /// Source-level type name of an instance.
    ///
    /// Pointers, arrays and function signatures compose the rendering of
    /// their components. Named types are rendered by `syntax`, qualified
    /// unless `truncate_namespace` is set. `Undefined` renders as the
    /// syntax's undefined marker.
    pub fn render_type_string(&self, id: TypeId, syntax: &dyn TypeSyntax, truncate_namespace: bool) -> String
    {
        match self.get(id) {
            TypeInstance::Primitive(kind) => syntax.primitive(*kind),
            TypeInstance::Pointer { pointee } => {
                syntax.pointer(&self.render_type_string(*pointee, syntax, truncate_namespace))
            }
            TypeInstance::Array { element, length } => {
                syntax.array(&self.render_type_string(*element, syntax, truncate_namespace), *length)
            }
            TypeInstance::Function(function) => {
                let return_type = self.render_type_string(function.return_type, syntax, truncate_namespace);
                let parameters: Vec<String> = function
                    .parameters
                    .iter()
                    .map(|parameter| self.render_type_string(*parameter, syntax, truncate_namespace))
                    .collect();
                syntax.function(self, id, &return_type, &parameters)
            }
            TypeInstance::Aggregate(_) | TypeInstance::Enum(_) | TypeInstance::TemplateInstance(_) => syntax
                .named(self, id, truncate_namespace)
                .unwrap_or_else(|| syntax.undefined().to_string()),
            TypeInstance::Undefined { .. } => syntax.undefined().to_string(),
        }
    }

    /// Fully qualified display name, for logs and diagnostics.
    #[must_use]
    pub fn display_name(&self, id: TypeId) -> String
    {
        match self.get(id) {
            TypeInstance::Undefined { name } => name.clone(),
            _ => self.render_type_string(id, &DisplaySyntax, false),
        }
    }
}
