use pdc_lang::{AstNode, AstNodeKind, AstParam, IdentName, Range, Tree};

use crate::{Error, annotate::AnnotatedTree, section::Section, writer::ConversionWriter};

/// The conversion program for one routine.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Rendered source of the conversion function.
    pub code: String,
    pub name: String,
    /// Parameters of the routine; the conversion function and the exec routine share them.
    pub params: Vec<AstParam>,
    pub routine_name: Option<IdentName>,
    pub sections: Vec<Section>,
}

/// Builds the conversion program for the routine in `text`.
///
/// The first top-level definition is the routine. Text without one is treated
/// as the body of a routine that takes no parameters.
pub fn convert(text: &str, name: &str, template_fn: &str) -> Result<Conversion, Error> {
    let host = pdc_lang::parse(text)?;
    tracing::debug!(statements = host.body.len(), "parsed routine source");

    let (routine_name, params, block) = match host.first_def().map(|id| &host[id].kind) {
        Some(AstNodeKind::Def { name, params, body }) => (Some(name.clone()), params.clone(), body.clone()),
        _ => (None, Vec::new(), host.body.clone()),
    };

    let tree = AnnotatedTree::from_block(host, block)?;
    let body = tree.routine_body();
    let sections = tree.sections_in(body)?;

    let mut program = ConversionWriter::new(&tree, text, template_fn).write(body)?;
    let converted = std::mem::take(&mut program.body);
    let def = program.alloc(AstNode::new(
        AstNodeKind::Def {
            name: name.into(),
            params: params.clone(),
            body: converted,
        },
        Range::default(),
    ));
    program.body = vec![def];

    let code = pdc_lang::render(&program);
    tracing::debug!(name, sections = sections.len(), "converted");

    Ok(Conversion {
        code,
        name: name.to_string(),
        params,
        routine_name,
        sections,
    })
}

/// Wraps exec text in a definition with the routine's parameters.
pub fn exec_text(name: &str, params: &[AstParam], body: &str) -> String {
    let header = format!("def {}({}):", name, pdc_lang::render_params(params));
    if body.trim().is_empty() {
        return format!("{header}\n    pass");
    }

    let literal = pdc_lang::string_continuation_lines(body);
    let mut text = header;
    for (number, line) in (1..).zip(body.lines()) {
        text.push('\n');
        if literal.contains(&number) {
            text.push_str(line);
        } else if !line.trim().is_empty() {
            text.push_str("    ");
            text.push_str(line);
        }
    }
    text
}

/// Parses generated code, reporting failures together with the code.
pub(crate) fn parse_generated(code: &str) -> Result<Tree, Error> {
    pdc_lang::parse(code).map_err(|cause| Error::GeneratedCode {
        code: code.to_string(),
        cause,
    })
}
