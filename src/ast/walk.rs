//! Read-only traversal of a Flux AST.
//!
//! [`Node`] is a borrowed view over every node type so a single [`Visitor`]
//! can observe the whole tree in source order.

use super::*;

/// A borrowed reference to any AST node.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Package(&'a Package),
    File(&'a File),
    PackageClause(&'a PackageClause),
    ImportDeclaration(&'a ImportDeclaration),
    Identifier(&'a Identifier),

    ArrayExpr(&'a ArrayExpr),
    DictExpr(&'a DictExpr),
    FunctionExpr(&'a FunctionExpr),
    LogicalExpr(&'a LogicalExpr),
    ObjectExpr(&'a ObjectExpr),
    MemberExpr(&'a MemberExpr),
    IndexExpr(&'a IndexExpr),
    BinaryExpr(&'a BinaryExpr),
    UnaryExpr(&'a UnaryExpr),
    PipeExpr(&'a PipeExpr),
    CallExpr(&'a CallExpr),
    ConditionalExpr(&'a ConditionalExpr),
    StringExpr(&'a StringExpr),
    ParenExpr(&'a ParenExpr),
    IntegerLit(&'a IntegerLit),
    UintLit(&'a UintLit),
    FloatLit(&'a FloatLit),
    StringLit(&'a StringLit),
    DurationLit(&'a DurationLit),
    DateTimeLit(&'a DateTimeLit),
    RegexpLit(&'a RegexpLit),
    PipeLit(&'a PipeLit),
    BadExpr(&'a BadExpr),

    ExprStmt(&'a ExprStmt),
    VariableAssgn(&'a VariableAssgn),
    MemberAssgn(&'a MemberAssgn),
    OptionStmt(&'a OptionStmt),
    ReturnStmt(&'a ReturnStmt),
    BadStmt(&'a BadStmt),
    TestCaseStmt(&'a TestCaseStmt),
    BuiltinStmt(&'a BuiltinStmt),
    Block(&'a Block),

    Property(&'a Property),
    TextPart(&'a TextPart),
    InterpolatedPart(&'a InterpolatedPart),

    TypeExpression(&'a TypeExpression),
    MonoType(&'a MonoType),
    ParameterType(&'a ParameterType),
    PropertyType(&'a PropertyType),
    TypeConstraint(&'a TypeConstraint),
}

impl<'a> Node<'a> {
    pub fn from_expr(expr: &'a Expression) -> Node<'a> {
        match expr {
            Expression::Identifier(e) => Node::Identifier(e),
            Expression::Array(e) => Node::ArrayExpr(e),
            Expression::Dict(e) => Node::DictExpr(e),
            Expression::Function(e) => Node::FunctionExpr(e),
            Expression::Logical(e) => Node::LogicalExpr(e),
            Expression::Object(e) => Node::ObjectExpr(e),
            Expression::Member(e) => Node::MemberExpr(e),
            Expression::Index(e) => Node::IndexExpr(e),
            Expression::Binary(e) => Node::BinaryExpr(e),
            Expression::Unary(e) => Node::UnaryExpr(e),
            Expression::PipeExpr(e) => Node::PipeExpr(e),
            Expression::Call(e) => Node::CallExpr(e),
            Expression::Conditional(e) => Node::ConditionalExpr(e),
            Expression::StringExpr(e) => Node::StringExpr(e),
            Expression::Paren(e) => Node::ParenExpr(e),
            Expression::Integer(e) => Node::IntegerLit(e),
            Expression::Uint(e) => Node::UintLit(e),
            Expression::Float(e) => Node::FloatLit(e),
            Expression::StringLit(e) => Node::StringLit(e),
            Expression::Duration(e) => Node::DurationLit(e),
            Expression::DateTime(e) => Node::DateTimeLit(e),
            Expression::Regexp(e) => Node::RegexpLit(e),
            Expression::PipeLit(e) => Node::PipeLit(e),
            Expression::Bad(e) => Node::BadExpr(e),
        }
    }

    pub fn from_stmt(stmt: &'a Statement) -> Node<'a> {
        match stmt {
            Statement::Expr(s) => Node::ExprStmt(s),
            Statement::Variable(s) => Node::VariableAssgn(s),
            Statement::Option(s) => Node::OptionStmt(s),
            Statement::Return(s) => Node::ReturnStmt(s),
            Statement::Bad(s) => Node::BadStmt(s),
            Statement::TestCase(s) => Node::TestCaseStmt(s),
            Statement::Builtin(s) => Node::BuiltinStmt(s),
        }
    }

    fn from_property_key(key: &'a PropertyKey) -> Node<'a> {
        match key {
            PropertyKey::Identifier(id) => Node::Identifier(id),
            PropertyKey::StringLit(lit) => Node::StringLit(lit),
        }
    }

    pub fn base(&self) -> &'a BaseNode {
        match *self {
            Node::Package(n) => &n.base,
            Node::File(n) => &n.base,
            Node::PackageClause(n) => &n.base,
            Node::ImportDeclaration(n) => &n.base,
            Node::Identifier(n) => &n.base,
            Node::ArrayExpr(n) => &n.base,
            Node::DictExpr(n) => &n.base,
            Node::FunctionExpr(n) => &n.base,
            Node::LogicalExpr(n) => &n.base,
            Node::ObjectExpr(n) => &n.base,
            Node::MemberExpr(n) => &n.base,
            Node::IndexExpr(n) => &n.base,
            Node::BinaryExpr(n) => &n.base,
            Node::UnaryExpr(n) => &n.base,
            Node::PipeExpr(n) => &n.base,
            Node::CallExpr(n) => &n.base,
            Node::ConditionalExpr(n) => &n.base,
            Node::StringExpr(n) => &n.base,
            Node::ParenExpr(n) => &n.base,
            Node::IntegerLit(n) => &n.base,
            Node::UintLit(n) => &n.base,
            Node::FloatLit(n) => &n.base,
            Node::StringLit(n) => &n.base,
            Node::DurationLit(n) => &n.base,
            Node::DateTimeLit(n) => &n.base,
            Node::RegexpLit(n) => &n.base,
            Node::PipeLit(n) => &n.base,
            Node::BadExpr(n) => &n.base,
            Node::ExprStmt(n) => &n.base,
            Node::VariableAssgn(n) => &n.base,
            Node::MemberAssgn(n) => &n.base,
            Node::OptionStmt(n) => &n.base,
            Node::ReturnStmt(n) => &n.base,
            Node::BadStmt(n) => &n.base,
            Node::TestCaseStmt(n) => &n.base,
            Node::BuiltinStmt(n) => &n.base,
            Node::Block(n) => &n.base,
            Node::Property(n) => &n.base,
            Node::TextPart(n) => &n.base,
            Node::InterpolatedPart(n) => &n.base,
            Node::TypeExpression(n) => &n.base,
            Node::MonoType(n) => n.base(),
            Node::ParameterType(n) => n.base(),
            Node::PropertyType(n) => &n.base,
            Node::TypeConstraint(n) => &n.base,
        }
    }

    /// The JSON `"type"` name of the node.
    pub fn type_name(&self) -> &'static str {
        match *self {
            Node::Package(_) => "Package",
            Node::File(_) => "File",
            Node::PackageClause(_) => "PackageClause",
            Node::ImportDeclaration(_) => "ImportDeclaration",
            Node::Identifier(_) => "Identifier",
            Node::ArrayExpr(_) => "ArrayExpression",
            Node::DictExpr(_) => "DictExpression",
            Node::FunctionExpr(_) => "FunctionExpression",
            Node::LogicalExpr(_) => "LogicalExpression",
            Node::ObjectExpr(_) => "ObjectExpression",
            Node::MemberExpr(_) => "MemberExpression",
            Node::IndexExpr(_) => "IndexExpression",
            Node::BinaryExpr(_) => "BinaryExpression",
            Node::UnaryExpr(_) => "UnaryExpression",
            Node::PipeExpr(_) => "PipeExpression",
            Node::CallExpr(_) => "CallExpression",
            Node::ConditionalExpr(_) => "ConditionalExpression",
            Node::StringExpr(_) => "StringExpression",
            Node::ParenExpr(_) => "ParenExpression",
            Node::IntegerLit(_) => "IntegerLiteral",
            Node::UintLit(_) => "UnsignedIntegerLiteral",
            Node::FloatLit(_) => "FloatLiteral",
            Node::StringLit(_) => "StringLiteral",
            Node::DurationLit(_) => "DurationLiteral",
            Node::DateTimeLit(_) => "DateTimeLiteral",
            Node::RegexpLit(_) => "RegexpLiteral",
            Node::PipeLit(_) => "PipeLiteral",
            Node::BadExpr(_) => "BadExpression",
            Node::ExprStmt(_) => "ExpressionStatement",
            Node::VariableAssgn(_) => "VariableAssignment",
            Node::MemberAssgn(_) => "MemberAssignment",
            Node::OptionStmt(_) => "OptionStatement",
            Node::ReturnStmt(_) => "ReturnStatement",
            Node::BadStmt(_) => "BadStatement",
            Node::TestCaseStmt(_) => "TestCaseStatement",
            Node::BuiltinStmt(_) => "BuiltinStatement",
            Node::Block(_) => "Block",
            Node::Property(_) => "Property",
            Node::TextPart(_) => "TextPart",
            Node::InterpolatedPart(_) => "InterpolatedPart",
            Node::TypeExpression(_) => "TypeExpression",
            Node::MonoType(_) => "MonoType",
            Node::ParameterType(_) => "ParameterType",
            Node::PropertyType(_) => "PropertyType",
            Node::TypeConstraint(_) => "TypeConstraint",
        }
    }
}

/// Observes nodes during [`walk`].
pub trait Visitor<'a> {
    /// Called before a node's children. Return `false` to skip them.
    fn visit(&mut self, node: Node<'a>) -> bool;

    /// Called after a node's children, whether or not they were visited.
    fn done(&mut self, _node: Node<'a>) {}
}

/// Walks `node` and its descendants depth-first, in source order.
pub fn walk<'a, V: Visitor<'a>>(v: &mut V, node: Node<'a>) {
    if v.visit(node) {
        walk_children(v, node);
    }
    v.done(node);
}

fn walk_expr<'a, V: Visitor<'a>>(v: &mut V, expr: &'a Expression) {
    walk(v, Node::from_expr(expr));
}

fn walk_body<'a, V: Visitor<'a>>(v: &mut V, body: &'a [Statement]) {
    for stmt in body {
        walk(v, Node::from_stmt(stmt));
    }
}

fn walk_children<'a, V: Visitor<'a>>(v: &mut V, node: Node<'a>) {
    match node {
        Node::Package(n) => {
            for file in &n.files {
                walk(v, Node::File(file));
            }
        }
        Node::File(n) => {
            if let Some(pkg) = &n.package {
                walk(v, Node::PackageClause(pkg));
            }
            for import in &n.imports {
                walk(v, Node::ImportDeclaration(import));
            }
            walk_body(v, &n.body);
        }
        Node::PackageClause(n) => walk(v, Node::Identifier(&n.name)),
        Node::ImportDeclaration(n) => {
            if let Some(alias) = &n.alias {
                walk(v, Node::Identifier(alias));
            }
            walk(v, Node::StringLit(&n.path));
        }
        Node::ArrayExpr(n) => {
            for element in &n.elements {
                walk_expr(v, element);
            }
        }
        Node::DictExpr(n) => {
            for item in &n.elements {
                walk_expr(v, &item.key);
                walk_expr(v, &item.val);
            }
        }
        Node::FunctionExpr(n) => {
            for param in &n.params {
                walk(v, Node::Property(param));
            }
            match &n.body {
                FunctionBody::Block(block) => walk(v, Node::Block(block)),
                FunctionBody::Expr(expr) => walk_expr(v, expr),
            }
        }
        Node::LogicalExpr(n) => {
            walk_expr(v, &n.left);
            walk_expr(v, &n.right);
        }
        Node::ObjectExpr(n) => {
            if let Some(with) = &n.with {
                walk(v, Node::Identifier(with));
            }
            for property in &n.properties {
                walk(v, Node::Property(property));
            }
        }
        Node::MemberExpr(n) => {
            walk_expr(v, &n.object);
            walk(v, Node::from_property_key(&n.property));
        }
        Node::IndexExpr(n) => {
            walk_expr(v, &n.array);
            walk_expr(v, &n.index);
        }
        Node::BinaryExpr(n) => {
            walk_expr(v, &n.left);
            walk_expr(v, &n.right);
        }
        Node::UnaryExpr(n) => walk_expr(v, &n.argument),
        Node::PipeExpr(n) => {
            walk_expr(v, &n.argument);
            walk(v, Node::CallExpr(&n.call));
        }
        Node::CallExpr(n) => {
            walk_expr(v, &n.callee);
            for arg in &n.arguments {
                walk_expr(v, arg);
            }
        }
        Node::ConditionalExpr(n) => {
            walk_expr(v, &n.test);
            walk_expr(v, &n.consequent);
            walk_expr(v, &n.alternate);
        }
        Node::StringExpr(n) => {
            for part in &n.parts {
                match part {
                    StringExprPart::Text(text) => walk(v, Node::TextPart(text)),
                    StringExprPart::Interpolated(interp) => walk(v, Node::InterpolatedPart(interp)),
                }
            }
        }
        Node::ParenExpr(n) => walk_expr(v, &n.expression),
        Node::BadExpr(n) => {
            if let Some(expr) = &n.expression {
                walk_expr(v, expr);
            }
        }
        Node::ExprStmt(n) => walk_expr(v, &n.expression),
        Node::VariableAssgn(n) => {
            walk(v, Node::Identifier(&n.id));
            walk_expr(v, &n.init);
        }
        Node::MemberAssgn(n) => {
            walk(v, Node::MemberExpr(&n.member));
            walk_expr(v, &n.init);
        }
        Node::OptionStmt(n) => match &n.assignment {
            Assignment::Variable(a) => walk(v, Node::VariableAssgn(a)),
            Assignment::Member(a) => walk(v, Node::MemberAssgn(a)),
        },
        Node::ReturnStmt(n) => walk_expr(v, &n.argument),
        Node::TestCaseStmt(n) => {
            walk(v, Node::Identifier(&n.id));
            if let Some(extends) = &n.extends {
                walk(v, Node::StringLit(extends));
            }
            walk(v, Node::Block(&n.block));
        }
        Node::BuiltinStmt(n) => {
            walk(v, Node::Identifier(&n.id));
            walk(v, Node::TypeExpression(&n.ty));
        }
        Node::Block(n) => walk_body(v, &n.body),
        Node::Property(n) => {
            walk(v, Node::from_property_key(&n.key));
            if let Some(value) = &n.value {
                walk_expr(v, value);
            }
        }
        Node::InterpolatedPart(n) => walk_expr(v, &n.expression),
        Node::TypeExpression(n) => {
            walk(v, Node::MonoType(&n.monotype));
            for constraint in &n.constraints {
                walk(v, Node::TypeConstraint(constraint));
            }
        }
        Node::MonoType(n) => match n {
            MonoType::Tvar(t) => walk(v, Node::Identifier(&t.name)),
            MonoType::Basic(t) => walk(v, Node::Identifier(&t.name)),
            MonoType::Array(t) => walk(v, Node::MonoType(&t.element)),
            MonoType::Dict(t) => {
                walk(v, Node::MonoType(&t.key));
                walk(v, Node::MonoType(&t.val));
            }
            MonoType::Record(t) => {
                if let Some(tvar) = &t.tvar {
                    walk(v, Node::Identifier(tvar));
                }
                for property in &t.properties {
                    walk(v, Node::PropertyType(property));
                }
            }
            MonoType::Function(t) => {
                for param in &t.parameters {
                    walk(v, Node::ParameterType(param));
                }
                walk(v, Node::MonoType(&t.monotype));
            }
        },
        Node::ParameterType(n) => {
            match n {
                ParameterType::Required(p) | ParameterType::Optional(p) => {
                    walk(v, Node::Identifier(&p.name))
                }
                ParameterType::Pipe(p) => {
                    if let Some(name) = &p.name {
                        walk(v, Node::Identifier(name));
                    }
                }
            }
            walk(v, Node::MonoType(n.monotype()));
        }
        Node::PropertyType(n) => {
            walk(v, Node::Identifier(&n.name));
            walk(v, Node::MonoType(&n.monotype));
        }
        Node::TypeConstraint(n) => {
            walk(v, Node::Identifier(&n.tvar));
            for kind in &n.kinds {
                walk(v, Node::Identifier(kind));
            }
        }
        Node::Identifier(_)
        | Node::IntegerLit(_)
        | Node::UintLit(_)
        | Node::FloatLit(_)
        | Node::StringLit(_)
        | Node::DurationLit(_)
        | Node::DateTimeLit(_)
        | Node::RegexpLit(_)
        | Node::PipeLit(_)
        | Node::BadStmt(_)
        | Node::TextPart(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    struct Recorder(Vec<&'static str>);

    impl<'a> Visitor<'a> for Recorder {
        fn visit(&mut self, node: Node<'a>) -> bool {
            self.0.push(node.type_name());
            true
        }
    }

    #[test]
    fn test_walk_visits_in_source_order() {
        let pkg = parse("a = 1 + 2");
        let mut rec = Recorder(Vec::new());
        walk(&mut rec, Node::Package(&pkg));
        assert_eq!(
            rec.0,
            vec![
                "Package",
                "File",
                "VariableAssignment",
                "Identifier",
                "BinaryExpression",
                "IntegerLiteral",
                "IntegerLiteral",
            ]
        );
    }

    #[test]
    fn test_visit_false_skips_children() {
        struct StopAtFile(usize);
        impl<'a> Visitor<'a> for StopAtFile {
            fn visit(&mut self, node: Node<'a>) -> bool {
                self.0 += 1;
                !matches!(node, Node::File(_))
            }
        }
        let pkg = parse("a = 1\nb = 2");
        let mut v = StopAtFile(0);
        walk(&mut v, Node::Package(&pkg));
        assert_eq!(v.0, 2);
    }

    #[test]
    fn test_done_balances_visit() {
        struct Depth {
            current: usize,
            max: usize,
        }
        impl<'a> Visitor<'a> for Depth {
            fn visit(&mut self, _node: Node<'a>) -> bool {
                self.current += 1;
                self.max = self.max.max(self.current);
                true
            }
            fn done(&mut self, _node: Node<'a>) {
                self.current -= 1;
            }
        }
        let pkg = parse("f(x: (1))");
        let mut v = Depth { current: 0, max: 0 };
        walk(&mut v, Node::Package(&pkg));
        assert_eq!(v.current, 0);
        assert!(v.max >= 7);
    }
}
