//! tree-sitter backed extraction.
//!
//! Walks the concrete syntax tree of a header and collects every class or
//! struct definition with a body. Class bodies and function bodies are not
//! descended into, so nested and local classes are ignored.

use tc_core::types::normalize_type;
use tc_core::{Access, MethodSignature, Parameter, Qualifiers};
use tree_sitter::{Language, Node, Parser};

use crate::{ClassDecl, ExtractError, ExtractorKind, SignatureExtractor};

/// AST extractor over `tree-sitter-cpp`.
pub struct AstExtractor {
    language: Language,
}

impl AstExtractor {
    /// Load the C++ grammar. Fails when the grammar ABI does not match the runtime.
    pub fn new() -> Result<Self, ExtractError> {
        let language: Language = tree_sitter_cpp::LANGUAGE.into();
        Parser::new()
            .set_language(&language)
            .map_err(|e| ExtractError::EngineUnavailable(e.to_string()))?;
        Ok(Self { language })
    }
}

impl SignatureExtractor for AstExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Ast
    }

    fn extract_classes(&self, source: &str) -> Result<Vec<ClassDecl>, ExtractError> {
        // Parser is not Sync; one per call keeps the extractor shareable.
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ExtractError::EngineUnavailable(e.to_string()))?;
        let tree = parser.parse(source, None).ok_or(ExtractError::ParseFailed)?;

        let mut walker = Walker {
            source: source.as_bytes(),
            namespace: Vec::new(),
            classes: Vec::new(),
        };
        walker.visit(tree.root_node());
        Ok(walker.classes)
    }
}

struct Walker<'s> {
    source: &'s [u8],
    namespace: Vec<String>,
    classes: Vec<ClassDecl>,
}

impl<'s> Walker<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn slice(&self, start: usize, end: usize) -> &'s str {
        self.source
            .get(start..end)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "class_specifier" | "struct_specifier" => {
                if let Some(class) = self.class_decl(node) {
                    self.classes.push(class);
                }
            }
            "namespace_definition" => {
                let depth = self.namespace.len();
                if let Some(name) = node.child_by_field_name("name") {
                    let segments = self
                        .text(name)
                        .split("::")
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>();
                    self.namespace.extend(segments);
                }
                if let Some(body) = node.child_by_field_name("body") {
                    for child in children(body) {
                        self.visit(child);
                    }
                }
                self.namespace.truncate(depth);
            }
            "compound_statement" => {}
            _ => {
                for child in children(node) {
                    self.visit(child);
                }
            }
        }
    }

    fn class_decl(&self, node: Node) -> Option<ClassDecl> {
        let body = node.child_by_field_name("body")?;
        let name = self.type_name(node.child_by_field_name("name")?);
        if name.is_empty() {
            return None;
        }

        let is_struct = node.kind() == "struct_specifier";
        let mut class = ClassDecl::new(name, self.namespace.clone(), is_struct);

        let members = children(body);
        let labelled = members.iter().any(|m| m.kind() == "access_specifier");
        // An unlabelled body is treated as fully public.
        let mut access = if labelled && !is_struct {
            Access::Private
        } else {
            Access::Public
        };

        for member in members {
            self.member(member, &mut access, &mut class);
        }
        Some(class)
    }

    fn type_name(&self, node: Node) -> String {
        match node.kind() {
            "qualified_type_identifier" | "template_type" => node
                .child_by_field_name("name")
                .map(|n| self.type_name(n))
                .unwrap_or_default(),
            _ => self.text(node).trim().to_string(),
        }
    }

    fn member(&self, node: Node, access: &mut Access, class: &mut ClassDecl) {
        match node.kind() {
            "access_specifier" => {
                if let Some(label) = Access::from_keyword(self.text(node)) {
                    *access = label;
                }
            }
            "template_declaration" => {
                for child in children(node) {
                    self.member(child, access, class);
                }
            }
            "field_declaration" | "declaration" | "function_definition" => {
                self.declaration(node, *access, class)
            }
            _ => {}
        }
    }

    fn declaration(&self, node: Node, access: Access, class: &mut ClassDecl) {
        let specifiers = children(node);
        if specifiers.iter().any(|c| c.kind() == "delete_method_clause") {
            return;
        }
        let is_static = specifiers
            .iter()
            .any(|c| c.kind() == "storage_class_specifier" && self.text(*c) == "static");
        let is_virtual = specifiers
            .iter()
            .any(|c| matches!(c.kind(), "virtual" | "virtual_function_specifier"));
        let base_type = self.declared_type(node);

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();

        for declarator in declarators {
            let (inner, suffix) = unwrap_declarator(declarator);
            if inner.kind() == "function_declarator" {
                let member = Member {
                    base_type: &base_type,
                    suffix: &suffix,
                    access,
                    is_static,
                    is_virtual,
                };
                self.method(inner, member, class);
            } else if !is_static && !base_type.is_empty() {
                class.push_collaborator(normalize_type(&format!("{base_type}{suffix}")));
            }
        }
    }

    fn method(&self, declarator: Node, member: Member<'_>, class: &mut ClassDecl) {
        let Some(name) = declarator
            .child_by_field_name("declarator")
            .and_then(|n| self.method_name(n))
        else {
            return;
        };

        let parameters = declarator
            .child_by_field_name("parameters")
            .map(|list| self.parameters(list))
            .unwrap_or_default();

        if name == class.name {
            for parameter in parameters {
                class.push_collaborator(parameter.ty);
            }
            return;
        }

        let trailing = children(declarator);
        let is_const = trailing
            .iter()
            .any(|c| c.kind() == "type_qualifier" && self.text(*c) == "const");
        let is_virtual = member.is_virtual || trailing.iter().any(|c| c.kind() == "virtual_specifier");
        let trailing_return = trailing
            .iter()
            .find(|c| c.kind() == "trailing_return_type")
            .map(|t| self.text(*t).trim_start_matches("->").trim().to_string());

        let return_type = match trailing_return {
            Some(ty) if !ty.is_empty() => normalize_type(&ty),
            _ => normalize_type(&format!("{}{}", member.base_type, member.suffix)),
        };
        if return_type.is_empty() {
            return;
        }

        let signature = MethodSignature::new(class.name.clone(), name, parameters, return_type)
            .with_access(member.access)
            .with_qualifiers(Qualifiers {
                is_const,
                is_static: member.is_static,
                is_virtual,
            });
        class.push_signature(signature);
    }

    /// Plain method name; destructors, operators and conversions yield `None`.
    fn method_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "field_identifier" | "identifier" => Some(self.text(node).to_string()),
            "qualified_identifier" => node
                .child_by_field_name("name")
                .and_then(|n| self.method_name(n)),
            _ => None,
        }
    }

    /// Declared type including cv-qualifiers written around it.
    fn declared_type(&self, node: Node) -> String {
        let Some(ty) = node.child_by_field_name("type") else {
            return String::new();
        };
        let qualifiers = children(node)
            .into_iter()
            .filter(|c| c.kind() == "type_qualifier")
            .collect::<Vec<_>>();

        let mut parts: Vec<&str> = qualifiers
            .iter()
            .filter(|q| q.start_byte() < ty.start_byte())
            .map(|q| self.text(*q))
            .collect();
        parts.push(self.text(ty));
        parts.extend(
            qualifiers
                .iter()
                .filter(|q| q.start_byte() > ty.start_byte())
                .map(|q| self.text(*q)),
        );
        parts.join(" ")
    }

    fn parameters(&self, list: Node) -> Vec<Parameter> {
        let declarations: Vec<Node> = named_children(list)
            .into_iter()
            .filter(|p| {
                matches!(
                    p.kind(),
                    "parameter_declaration"
                        | "optional_parameter_declaration"
                        | "variadic_parameter_declaration"
                )
            })
            .collect();

        let mut parameters = Vec::with_capacity(declarations.len());
        for declaration in &declarations {
            let identifier = declaration
                .child_by_field_name("declarator")
                .and_then(declarator_identifier);
            let end = match declaration.child_by_field_name("default_value") {
                Some(_) => children(*declaration)
                    .into_iter()
                    .find(|c| c.kind() == "=")
                    .map(|eq| eq.start_byte())
                    .unwrap_or_else(|| declaration.end_byte()),
                None => declaration.end_byte(),
            };

            let start = declaration.start_byte();
            let ty = match identifier {
                Some(id) => format!(
                    "{}{}",
                    self.slice(start, id.start_byte()),
                    self.slice(id.end_byte(), end)
                ),
                None => self.slice(start, end).to_string(),
            };
            let ty = normalize_type(&ty);

            // `f(void)` has no parameters.
            if ty == "void" && identifier.is_none() && declarations.len() == 1 {
                continue;
            }
            let name = identifier.map(|id| self.text(id)).unwrap_or("");
            parameters.push(Parameter::new(name, ty));
        }
        parameters
    }
}

/// Per-declaration facts shared by each declarator.
struct Member<'a> {
    base_type: &'a str,
    suffix: &'a str,
    access: Access,
    is_static: bool,
    is_virtual: bool,
}

/// Strip pointer and reference declarators, returning the inner declarator
/// and the `*`/`&`/`&&` suffix they add to the declared type.
fn unwrap_declarator(mut node: Node) -> (Node, String) {
    let mut suffix = String::new();
    loop {
        let marker = match node.kind() {
            "pointer_declarator" => "*",
            "reference_declarator" => match node.child(0).map(|c| c.kind()) {
                Some("&&") => "&&",
                _ => "&",
            },
            _ => break,
        };
        suffix.push_str(marker);

        let next = node
            .child_by_field_name("declarator")
            .or_else(|| last_named_child(node));
        match next {
            Some(inner) => node = inner,
            None => break,
        }
    }
    (node, suffix)
}

fn declarator_identifier(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" => Some(node),
        "parameter_list" | "template_argument_list" => None,
        kind if kind.starts_with("abstract_") => None,
        _ => named_children(node)
            .into_iter()
            .find_map(declarator_identifier),
    }
}

fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn last_named_child(node: Node) -> Option<Node> {
    node.named_child_count()
        .checked_sub(1)
        .and_then(|i| node.named_child(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<ClassDecl> {
        AstExtractor::new().unwrap().extract_classes(source).unwrap()
    }

    fn method<'a>(class: &'a ClassDecl, name: &str) -> &'a MethodSignature {
        class
            .signatures
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("method {name} not found in {:?}", class.signatures))
    }

    #[test]
    fn test_access_labels_and_class_default() {
        let classes = extract(
            r#"
class Account {
    int hidden();
public:
    Account();
    double balance() const;
protected:
    void audit();
private:
    void reset();
};
"#,
        );
        assert_eq!(classes.len(), 1);
        let account = &classes[0];
        assert_eq!(method(account, "hidden").access, Access::Private);
        assert_eq!(method(account, "balance").access, Access::Public);
        assert!(method(account, "balance").qualifiers.is_const);
        assert_eq!(method(account, "audit").access, Access::Protected);
        assert_eq!(method(account, "reset").access, Access::Private);
        assert_eq!(account.signatures.len(), 4, "constructor is not a method");
    }

    #[test]
    fn test_struct_with_labels_defaults_public() {
        let classes = extract("struct Point { int x() const; private: int y_; };");
        assert!(classes[0].is_struct);
        assert_eq!(method(&classes[0], "x").access, Access::Public);
    }

    #[test]
    fn test_namespaces_are_recorded() {
        let classes = extract(
            r#"
namespace net {
namespace http {
class Client {
public:
    int send(const Request& request, int retries = 3);
};
}
}
"#,
        );
        assert_eq!(classes[0].namespace, vec!["net", "http"]);
        let send = method(&classes[0], "send");
        assert_eq!(send.parameters.len(), 2);
        assert_eq!(send.parameters[0].ty, "const Request&");
        assert_eq!(send.parameters[0].name, "request");
        assert_eq!(send.parameters[1].ty, "int");
        assert_eq!(send.parameters[1].name, "retries");
    }

    #[test]
    fn test_qualifiers_and_reference_returns() {
        let classes = extract(
            r#"
class Registry {
public:
    virtual ~Registry();
    virtual int size() const = 0;
    static Registry& instance();
    const std::string& name() const;
    bool operator==(const Registry& other) const;
};
"#,
        );
        let registry = &classes[0];
        assert_eq!(registry.signatures.len(), 3, "{:?}", registry.signatures);

        let size = method(registry, "size");
        assert!(size.qualifiers.is_virtual);
        assert!(size.qualifiers.is_const);
        assert_eq!(size.return_type, "int");

        let instance = method(registry, "instance");
        assert!(instance.qualifiers.is_static);
        assert_eq!(instance.return_type, "Registry&");

        assert_eq!(method(registry, "name").return_type, "const std::string&");
    }

    #[test]
    fn test_inline_definitions_and_void_parameter_list() {
        let classes = extract(
            r#"
class Counter {
public:
    int next(void) { return ++value_; }
    void add(int amount) { value_ += amount; }
private:
    int value_ = 0;
};
"#,
        );
        let counter = &classes[0];
        assert!(method(counter, "next").parameters.is_empty());
        assert_eq!(method(counter, "add").parameters[0].ty, "int");
        assert!(counter.collaborators.is_empty());
    }

    #[test]
    fn test_constructor_params_and_members_are_collaborators() {
        let classes = extract(
            r#"
class OrderService {
public:
    OrderService(std::shared_ptr<Database> db, Clock& clock);
    bool place(const Order& order);
private:
    PaymentGateway* gateway_;
    static Metrics metrics_;
};
"#,
        );
        let service = &classes[0];
        assert_eq!(service.signatures.len(), 1);
        assert!(service.collaborators.contains(&"std::shared_ptr<Database>".to_string()));
        assert!(service.collaborators.contains(&"Clock&".to_string()));
        assert!(service.collaborators.contains(&"PaymentGateway*".to_string()));
        assert!(!service.collaborators.iter().any(|c| c.contains("Metrics")));
    }

    #[test]
    fn test_nested_and_forward_declarations_are_skipped() {
        let classes = extract(
            r#"
class Forward;
class Outer {
public:
    struct Inner { int value(); };
    int run();
};
"#,
        );
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Outer");
        assert_eq!(classes[0].signatures.len(), 1);
    }

    #[test]
    fn test_overloads_are_distinct() {
        let classes = extract(
            r#"
class Parser {
public:
    int parse(const std::string& text);
    int parse(const char* text, size_t len);
};
"#,
        );
        assert_eq!(classes[0].signatures.len(), 2);
    }
}
