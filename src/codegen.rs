//! Source synthesis for compiled units
//!
//! Builds the text of one unit from a declaration and a fully bound variant:
//! one function per group variant, each made of its signature, `cdef`
//! declarations, `DEF` constants and the unrolled body.

use std::collections::HashSet;

use crate::decorated::Decorated;
use crate::error::{TurboError, TurboResult};
use crate::native::{ParamKind, Signature};
use crate::typespec::{CDef, TypeSpec};
use crate::types::ConstValue;
use crate::unroll::unroll;
use crate::variant::Variant;

pub const HEADER: &str = "# cython: language_level=3\n\ncimport numpy as np\nimport cython\n";

pub const PYXBLD: &str = "from distutils.extension import Extension
import numpy as np

def make_ext(name, source):
    return Extension(name, [source], include_dirs = [np.get_include()])
";

const DECORATORS: [&str; 2] = [
    "@cython.boundscheck(False)",
    "@cython.cdivision(True) # Don't check for divide-by-zero.",
];

/// Code generator for one target dialect
pub struct CodeGenerator {
    eol: String,
}

impl CodeGenerator {
    pub fn new(eol: impl Into<String>) -> Self {
        Self { eol: eol.into() }
    }

    fn with_eol(&self, text: &str) -> String {
        if self.eol == "\n" {
            text.to_string()
        } else {
            text.replace('\n', &self.eol)
        }
    }

    /// Build description accompanying every unit
    pub fn build_text(&self) -> String {
        self.with_eol(PYXBLD)
    }

    /// Whole unit: header, then one function per variant sharing the unit
    pub fn unit_text(&self, decorated: &Decorated, variant: &Variant) -> TurboResult<String> {
        let mut text = self.with_eol(HEADER);
        for member in variant.group_variants(decorated.groups()) {
            text.push_str(&self.function_text(decorated, &member)?);
        }
        Ok(text)
    }

    /// One specialized function
    pub fn function_text(&self, decorated: &Decorated, variant: &Variant) -> TurboResult<String> {
        let suffix = variant.complete_suffix()?;

        let mut params = Vec::new();
        let mut decls: Vec<CDef> = Vec::new();
        for name in decorated.param_names() {
            let spec = spec_of(decorated, name)?;
            params.push(spec.param_decl(variant, name)?);
            decls.extend(spec.local_decls(variant, name, true)?);
        }
        let declared: HashSet<String> = params
            .iter()
            .chain(decls.iter())
            .map(|d| d.name.clone())
            .collect();
        for name in decorated.local_names() {
            if !declared.contains(name) {
                decls.extend(spec_of(decorated, name)?.local_decls(variant, name, false)?);
            }
        }

        let consts = self.consts(decorated, variant)?;
        let defs: Vec<String> = consts
            .iter()
            .map(|(name, value)| format!("DEF {} = {}", name, value.repr()))
            .collect();
        let body = unroll(decorated.body(), &consts.into_iter().collect())?;

        let mut text = String::from("\n");
        for decorator in DECORATORS {
            text.push_str(decorator);
            text.push('\n');
        }
        let cparams: Vec<String> = params.iter().map(ToString::to_string).collect();
        text.push_str(&format!("def {}{}({}):\n", decorated.name(), suffix, cparams.join(", ")));
        for line in decls.iter().map(ToString::to_string).chain(defs) {
            text.push_str(decorated.body_indent());
            text.push_str(&line);
            text.push('\n');
        }
        text.push_str(&body);
        Ok(self.with_eol(&text))
    }

    /// Constant names with the values the variant binds them to, in declaration order
    fn consts(&self, decorated: &Decorated, variant: &Variant) -> TurboResult<Vec<(String, ConstValue)>> {
        decorated
            .const_names()
            .iter()
            .map(|name| Ok((name.clone(), spec_of(decorated, name)?.resolved_obj(variant, name)?)))
            .collect()
    }

    /// Argument policy the compiled function enforces
    pub fn signature(&self, decorated: &Decorated, variant: &Variant) -> TurboResult<Signature> {
        let suffix = variant.complete_suffix()?;
        let params = decorated
            .param_names()
            .iter()
            .map(|name| param_kind(spec_of(decorated, name)?, variant))
            .collect::<TurboResult<_>>()?;
        Ok(Signature {
            function: format!("{}{}", decorated.name(), suffix),
            params,
        })
    }
}

fn spec_of<'a>(decorated: &'a Decorated, name: &str) -> TurboResult<&'a TypeSpec> {
    decorated.spec(name).ok_or_else(|| TurboError::untyped(name))
}

fn param_kind(spec: &TypeSpec, variant: &Variant) -> TurboResult<ParamKind> {
    Ok(match spec {
        TypeSpec::Scalar(element) => ParamKind::Scalar(element.resolved(variant)?.scalar_type()?),
        TypeSpec::Array { element, ndim } => ParamKind::Array {
            dtype: element.resolved(variant)?.scalar_type()?,
            ndim: *ndim,
        },
        TypeSpec::Composite(fields) => ParamKind::Object(
            fields
                .iter()
                .map(|(name, field)| Ok((name.clone(), param_kind(field, variant)?)))
                .collect::<TurboResult<_>>()?,
        ),
    })
}
