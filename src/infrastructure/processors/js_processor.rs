use crate::core::{interfaces::JsProcessor, models::*};
use crate::utils::{Logger, Result, TailpackError};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Program, Statement,
};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use std::path::Path;

/// Registry shared by every chunk on a page. Idempotent, so the vendor chunk
/// and each entry chunk can all carry it.
const RUNTIME: &str = r#"var __tailpack = globalThis.__tailpack || (globalThis.__tailpack = (function () {
  var defs = {}, cache = {};
  function require(id) {
    if (cache[id]) return cache[id];
    var def = defs[id];
    if (!def) throw new Error("tailpack: module not found: " + id);
    var exports = cache[id] = {};
    def(exports, require);
    return exports;
  }
  function exportGetters(target, getters) {
    Object.keys(getters).forEach(function (name) {
      Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
    });
  }
  function exportAll(target, source) {
    Object.keys(source).forEach(function (name) {
      if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
        Object.defineProperty(target, name, { enumerable: true, get: function () { return source[name]; } });
      }
    });
  }
  return {
    define: function (id, fn) { if (!defs[id]) defs[id] = fn; },
    require: require,
    exports: exportGetters,
    exportAll: exportAll
  };
})());
"#;

const DEFAULT_BINDING: &str = "__tailpack_default";

#[derive(Clone, Default)]
pub struct OxcJsProcessor;

impl OxcJsProcessor {
    pub fn new() -> Self {
        Self
    }

    fn source_type(path: &Path) -> SourceType {
        SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs())
    }

    fn parse<'a>(
        allocator: &'a Allocator,
        path: &Path,
        content: &'a str,
        stage: &str,
    ) -> Result<Program<'a>> {
        let parsed = Parser::new(allocator, content, Self::source_type(path)).parse();

        if !parsed.errors.is_empty() || parsed.panicked {
            let errors: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
            return Err(TailpackError::transform(path, stage, errors.join("\n")));
        }

        Ok(parsed.program)
    }
}

fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// Source rewrites collected from the top-level module statements.
#[derive(Default)]
struct ModuleRewrite {
    edits: Vec<(usize, usize, String)>,
    /// exported name -> expression evaluated lazily
    getters: Vec<(String, String)>,
}

impl ModuleRewrite {
    fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.push((start as usize, end as usize, text.into()));
    }

    fn getter(&mut self, exported: impl Into<String>, expr: impl Into<String>) {
        self.getters.push((exported.into(), expr.into()));
    }

    fn apply(mut self, source: &str) -> (String, Vec<(String, String)>) {
        self.edits.sort_by_key(|(start, _, _)| *start);

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for (start, end, text) in &self.edits {
            if *start < cursor {
                continue;
            }
            out.push_str(&source[cursor..*start]);
            out.push_str(text);
            cursor = *end;
        }
        out.push_str(&source[cursor..]);

        (out, self.getters)
    }
}

impl JsProcessor for OxcJsProcessor {
    fn extract_dependencies(&self, path: &Path, content: &str) -> Result<Vec<String>> {
        let allocator = Allocator::default();
        let program = Self::parse(&allocator, path, content, "parse")?;

        let mut dependencies = Vec::new();
        for stmt in &program.body {
            let source = match stmt {
                Statement::ImportDeclaration(decl) => Some(&decl.source),
                Statement::ExportNamedDeclaration(decl) => decl.source.as_ref(),
                Statement::ExportAllDeclaration(decl) => Some(&decl.source),
                _ => None,
            };
            if let Some(source) = source {
                let specifier = source.value.to_string();
                if !dependencies.contains(&specifier) {
                    dependencies.push(specifier);
                }
            }
        }

        Ok(dependencies)
    }

    fn transform_module(&self, module: &ModuleInfo) -> Result<String> {
        Logger::processing_script(&module.id);

        let allocator = Allocator::default();
        let program = Self::parse(&allocator, &module.path, &module.content, "script")?;
        let require = |specifier: &str| {
            module
                .import_ids
                .get(specifier)
                .map(|id| format!("__require({})", quoted(id)))
        };

        let mut rewrite = ModuleRewrite::default();

        for stmt in &program.body {
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let specifier = decl.source.value.as_str();
                    let Some(required) = require(specifier) else {
                        // Stylesheet imports are bundled separately.
                        rewrite.replace(decl.span.start, decl.span.end, "");
                        continue;
                    };

                    let mut fields = Vec::new();
                    let mut namespace = None;
                    if let Some(specifiers) = &decl.specifiers {
                        for spec in specifiers {
                            match spec {
                                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                    let imported = s.imported.name().to_string();
                                    let local = s.local.name.to_string();
                                    if imported == local {
                                        fields.push(local);
                                    } else {
                                        fields.push(format!("{}: {}", quoted(&imported), local));
                                    }
                                }
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    fields.push(format!("default: {}", s.local.name));
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    namespace = Some(s.local.name.to_string());
                                }
                            }
                        }
                    }

                    let mut replacement = String::new();
                    if let Some(ns) = namespace {
                        replacement.push_str(&format!("var {} = {};", ns, required));
                        if !fields.is_empty() {
                            replacement.push_str(&format!(" var {{ {} }} = {};", fields.join(", "), ns));
                        }
                    } else if fields.is_empty() {
                        replacement.push_str(&format!("{};", required));
                    } else {
                        replacement.push_str(&format!("var {{ {} }} = {};", fields.join(", "), required));
                    }
                    rewrite.replace(decl.span.start, decl.span.end, replacement);
                }

                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(declaration) = &decl.declaration {
                        for name in declared_names(declaration) {
                            rewrite.getter(name.clone(), name);
                        }
                        // Keep the declaration, drop the `export` keyword
                        rewrite.replace(decl.span.start, declaration.span().start, "");
                        continue;
                    }

                    let source = match &decl.source {
                        Some(source) => Some(require(source.value.as_str()).ok_or_else(|| {
                            TailpackError::transform(
                                &module.path,
                                "script",
                                format!("cannot re-export from '{}'", source.value),
                            )
                        })?),
                        None => None,
                    };

                    for spec in &decl.specifiers {
                        let local = spec.local.name().to_string();
                        let exported = spec.exported.name().to_string();
                        let expr = match &source {
                            Some(required) if local == "default" => format!("{}.default", required),
                            Some(required) => format!("{}[{}]", required, quoted(&local)),
                            None => local,
                        };
                        rewrite.getter(exported, expr);
                    }

                    let replacement = source.map(|s| format!("{};", s)).unwrap_or_default();
                    rewrite.replace(decl.span.start, decl.span.end, replacement);
                }

                Statement::ExportAllDeclaration(decl) => {
                    let required = require(decl.source.value.as_str()).ok_or_else(|| {
                        TailpackError::transform(
                            &module.path,
                            "script",
                            format!("cannot re-export from '{}'", decl.source.value),
                        )
                    })?;

                    match &decl.exported {
                        Some(name) => {
                            rewrite.getter(name.name().to_string(), required.clone());
                            rewrite.replace(decl.span.start, decl.span.end, format!("{};", required));
                        }
                        None => {
                            rewrite.replace(
                                decl.span.start,
                                decl.span.end,
                                format!("__tailpack.exportAll(__exports, {});", required),
                            );
                        }
                    }
                }

                Statement::ExportDefaultDeclaration(decl) => {
                    let inner = decl.declaration.span();
                    let named = match &decl.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                            f.id.as_ref().map(|id| id.name.to_string())
                        }
                        ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                            c.id.as_ref().map(|id| id.name.to_string())
                        }
                        _ => None,
                    };

                    match named {
                        Some(name) => {
                            rewrite.replace(decl.span.start, inner.start, "");
                            rewrite.getter("default", name);
                        }
                        None => {
                            rewrite.replace(
                                decl.span.start,
                                inner.start,
                                format!("var {} = ", DEFAULT_BINDING),
                            );
                            rewrite.replace(decl.span.end, decl.span.end, ";");
                            rewrite.getter("default", DEFAULT_BINDING);
                        }
                    }
                }

                _ => {}
            }
        }

        let (body, getters) = rewrite.apply(&module.content);

        let mut out = String::with_capacity(body.len() + 128);
        out.push_str(&format!(
            "__tailpack.define({}, function (__exports, __require) {{\n",
            quoted(&module.id)
        ));
        if !getters.is_empty() {
            let entries: Vec<String> = getters
                .iter()
                .map(|(name, expr)| format!("  {}: function () {{ return {}; }}", quoted(name), expr))
                .collect();
            out.push_str(&format!("__tailpack.exports(__exports, {{\n{}\n}});\n", entries.join(",\n")));
        }
        out.push_str(body.trim_end());
        out.push_str("\n});\n");

        Ok(out)
    }

    fn minify(&self, asset: &Path, code: &str) -> Result<String> {
        let _timer = crate::utils::Timer::start(&format!("Minifying {}", asset.display()));

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
        if !parsed.errors.is_empty() || parsed.panicked {
            let errors: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
            return Err(TailpackError::transform(asset, "minify", errors.join("\n")));
        }

        let codegen_options = CodegenOptions {
            minify: true,
            ..Default::default()
        };
        Ok(Codegen::new().with_options(codegen_options).build(&parsed.program).code)
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Wrap transformed modules into one chunk, optionally running `run` on load.
pub fn assemble_chunk(prelude: Option<&str>, modules: &[String], run: Option<&str>) -> String {
    let mut bundle = String::new();
    bundle.push_str("(function () {\n'use strict';\n");
    bundle.push_str(RUNTIME);
    for module in modules {
        bundle.push_str(module);
    }
    if let Some(id) = run {
        bundle.push_str(&format!("__tailpack.require({});\n", quoted(id)));
    }
    bundle.push_str("})();\n");

    match prelude {
        Some(prelude) => format!("{}\n{}", prelude, bundle),
        None => bundle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn module(id: &str, content: &str, imports: &[(&str, &str)]) -> ModuleInfo {
        ModuleInfo {
            path: PathBuf::from(format!("/p/{}", id)),
            id: id.to_string(),
            content: content.to_string(),
            module_type: ModuleType::JavaScript,
            dependencies: vec![],
            import_ids: imports
                .iter()
                .map(|(s, id)| (s.to_string(), id.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_extract_dependencies_in_source_order() {
        let processor = OxcJsProcessor::new();
        let deps = processor
            .extract_dependencies(
                Path::new("main.js"),
                r#"
import Alpine from 'alpinejs';
import './main.css';
export { format } from "./format.js";
export * from './helpers';
import Alpine2 from 'alpinejs';
const x = 1;
"#,
            )
            .unwrap();

        assert_eq!(deps, vec!["alpinejs", "./main.css", "./format.js", "./helpers"]);
    }

    #[test]
    fn test_syntax_error_is_transform_error() {
        let processor = OxcJsProcessor::new();
        let err = processor
            .extract_dependencies(Path::new("broken.js"), "const = ;")
            .unwrap_err();
        assert!(matches!(err, TailpackError::Transform { ref stage, .. } if stage == "parse"));
    }

    #[test]
    fn test_transform_rewrites_imports_and_exports() {
        let processor = OxcJsProcessor::new();
        let m = module(
            "src/main.js",
            r#"import { helper, other as renamed } from './helper.js';
import Alpine from 'alpinejs';
import './main.css';
export const answer = 42;
export function greet() { return helper(); }
const result = renamed();
console.log(result);
"#,
            &[("./helper.js", "src/helper.js"), ("alpinejs", "node_modules/alpinejs/index.js")],
        );

        let out = processor.transform_module(&m).unwrap();

        assert!(out.starts_with("__tailpack.define(\"src/main.js\""));
        assert!(out.contains("var { helper, \"other\": renamed } = __require(\"src/helper.js\");"));
        assert!(out.contains("var { default: Alpine } = __require(\"node_modules/alpinejs/index.js\");"));
        assert!(!out.contains("main.css"));
        assert!(!out.contains("export "));
        assert!(out.contains("const answer = 42;"));
        assert!(out.contains("function greet()"));
        assert!(out.contains("\"answer\": function () { return answer; }"));
        assert!(out.contains("console.log(result);"));
    }

    #[test]
    fn test_anonymous_default_export_gets_binding() {
        let processor = OxcJsProcessor::new();
        let m = module("src/config.js", "export default { debug: true }\n", &[]);

        let out = processor.transform_module(&m).unwrap();
        assert!(out.contains("var __tailpack_default = { debug: true };"));
        assert!(out.contains("\"default\": function () { return __tailpack_default; }"));
    }

    #[test]
    fn test_reexports_are_lazy_getters() {
        let processor = OxcJsProcessor::new();
        let m = module(
            "src/index.js",
            "export { format as fmt } from './format.js';\nexport * from './more.js';\n",
            &[("./format.js", "src/format.js"), ("./more.js", "src/more.js")],
        );

        let out = processor.transform_module(&m).unwrap();
        assert!(out.contains("\"fmt\": function () { return __require(\"src/format.js\")[\"format\"]; }"));
        assert!(out.contains("__tailpack.exportAll(__exports, __require(\"src/more.js\"));"));
    }

    #[test]
    fn test_assemble_chunk_runs_entry() {
        let chunk = assemble_chunk(None, &["/* a */\n".to_string()], Some("src/main.js"));
        assert!(chunk.starts_with("(function () {"));
        assert!(chunk.contains("/* a */"));
        assert!(chunk.contains("__tailpack.require(\"src/main.js\");"));
        assert!(chunk.ends_with("})();\n"));

        let vendors = assemble_chunk(None, &[], None);
        assert!(!vendors.contains("__tailpack.require(\""));
    }

    #[test]
    fn test_minify_shrinks_bundle() {
        let processor = OxcJsProcessor::new();
        let source = assemble_chunk(None, &[], Some("src/main.js"));
        let minified = processor.minify(Path::new("main.js"), &source).unwrap();
        assert!(minified.len() < source.len());
        assert!(minified.contains("tailpack"));
    }
}
