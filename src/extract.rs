//! Problem document extraction.
//!
//! The document grammar is positional: title, then the description, problem,
//! solution, tests and hidden tests sections, each introduced by a heading
//! whose text is ignored. Missing trailing sections degrade to empty values;
//! only the title, the insertion marker and the problem/solution code contract
//! are enforced.

use tracing::{debug, instrument};

use crate::domain::{ProblemDocument, TestCase, DEFAULT_LANGUAGE, INSERTION_MARKER};
use crate::error::MalformedDocument;
use crate::markdown::{tokenize, Token};

/// Read-only cursor over a token slice.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    /// Drop tokens up to and including the next heading.
    fn skip_past_heading(&mut self) {
        while let Some(tok) = self.advance() {
            if tok.is_heading() {
                return;
            }
        }
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(Token::is_space) {
            self.pos += 1;
        }
    }

    /// Concatenate raw source until the next heading (exclusive).
    fn collect_until_heading(&mut self) -> String {
        let mut out = String::new();
        while let Some(tok) = self.peek() {
            if tok.is_heading() {
                break;
            }
            out.push_str(tok.raw());
            self.pos += 1;
        }
        out
    }

    /// Take the next token if it is a code block.
    fn take_code(&mut self) -> Option<(Option<&'a str>, &'a str)> {
        match self.peek()? {
            Token::Code { lang, text, .. } => {
                self.pos += 1;
                Some((lang.as_deref(), text.as_str()))
            }
            _ => None,
        }
    }

    fn take_paragraph(&mut self) -> Option<&'a str> {
        match self.peek()? {
            Token::Paragraph { text, .. } => {
                self.pos += 1;
                Some(text.as_str())
            }
            _ => None,
        }
    }

    /// (code, paragraph) pairs until the pattern breaks.
    fn collect_tests(&mut self) -> Vec<TestCase> {
        let mut tests = Vec::new();
        loop {
            self.skip_space();
            let Some((_, code)) = self.take_code() else { break };
            self.skip_space();
            let Some(expected) = self.take_paragraph() else { break };
            tests.push(TestCase { code: code.to_string(), expected: expected.to_string() });
        }
        tests
    }
}

/// Parse markdown text into a problem document.
pub fn parse_document(text: &str) -> Result<ProblemDocument, MalformedDocument> {
    extract(&tokenize(text))
}

/// Build a `ProblemDocument` from the token stream of a problem file.
#[instrument(level = "debug", skip(tokens), fields(tokens = tokens.len()))]
pub fn extract(tokens: &[Token]) -> Result<ProblemDocument, MalformedDocument> {
    let mut cur = TokenCursor::new(tokens);

    let title = match cur.advance() {
        Some(Token::Heading { text, .. }) => text.clone(),
        _ => return Err(MalformedDocument::MissingTitle),
    };

    cur.skip_past_heading();
    let description = cur.collect_until_heading();

    cur.skip_past_heading();
    cur.skip_space();
    let (lang, problem_code) = cur
        .take_code()
        .ok_or(MalformedDocument::MissingCodeBlock { section: "problem" })?;
    let code_language = resolve_language(lang);
    let (template_prefix, template_suffix) = split_template(problem_code)?;

    cur.skip_past_heading();
    cur.skip_space();
    let (solution_lang, solution_code) = cur
        .take_code()
        .ok_or(MalformedDocument::MissingCodeBlock { section: "solution" })?;
    let solution_language = resolve_language(solution_lang);
    if solution_language != code_language {
        return Err(MalformedDocument::SolutionLanguageMismatch {
            problem: code_language,
            solution: solution_language,
        });
    }
    let solution_explanation = cur.collect_until_heading();

    cur.skip_past_heading();
    let visible_tests = cur.collect_tests();

    cur.skip_past_heading();
    let hidden_tests = cur.collect_tests();

    debug!(
        target: "problem",
        %title,
        %code_language,
        visible = visible_tests.len(),
        hidden = hidden_tests.len(),
        "Problem document extracted"
    );

    Ok(ProblemDocument {
        title,
        description,
        code_language,
        template_prefix,
        template_suffix,
        reference_solution: solution_code.to_string(),
        solution_explanation,
        visible_tests,
        hidden_tests,
    })
}

fn resolve_language(lang: Option<&str>) -> String {
    lang.filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LANGUAGE).to_string()
}

/// Split the problem template around its single insertion marker.
fn split_template(code: &str) -> Result<(String, String), MalformedDocument> {
    match code.matches(INSERTION_MARKER).count() {
        0 => Err(MalformedDocument::MissingInsertionMarker),
        1 => {
            let (before, after) = code
                .split_once(INSERTION_MARKER)
                .ok_or(MalformedDocument::MissingInsertionMarker)?;
            Ok((before.trim().to_string(), after.trim().to_string()))
        }
        count => Err(MalformedDocument::MultipleInsertionMarkers { count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Add Numbers

## Description

Write code that adds numbers.

It should be *fast*.

## Problem

```javascript
const x = 1;
// Your code here
console.log(x);
```

## Solution

```javascript
let y = x + 1;
```

Just add one.

## Tests

```javascript
return 1+1;
```

2

```javascript
let a = 3;
a * 2
```

6

## Hidden Tests

```javascript
return 10;
```

10
";

    #[test]
    fn extracts_every_section() {
        let doc = parse_document(DOC).unwrap();
        assert_eq!(doc.title, "Add Numbers");
        assert_eq!(doc.description, "\nWrite code that adds numbers.\n\nIt should be *fast*.\n\n");
        assert_eq!(doc.code_language, "javascript");
        assert_eq!(doc.template_prefix, "const x = 1;");
        assert_eq!(doc.template_suffix, "console.log(x);");
        assert_eq!(doc.reference_solution, "let y = x + 1;");
        assert_eq!(doc.solution_explanation, "\nJust add one.\n\n");
        assert_eq!(
            doc.visible_tests,
            vec![
                TestCase { code: "return 1+1;".into(), expected: "2".into() },
                TestCase { code: "let a = 3;\na * 2".into(), expected: "6".into() },
            ]
        );
        assert_eq!(doc.hidden_tests, vec![TestCase { code: "return 10;".into(), expected: "10".into() }]);
    }

    #[test]
    fn caller_tokens_are_untouched() {
        let tokens = tokenize(DOC);
        let before = tokens.clone();
        extract(&tokens).unwrap();
        assert_eq!(tokens, before);
    }

    #[test]
    fn prose_sections_are_verbatim_source() {
        let doc = parse_document(DOC).unwrap();
        let start = DOC.find("## Description\n").unwrap() + "## Description\n".len();
        let end = DOC.find("## Problem").unwrap();
        assert_eq!(doc.description, &DOC[start..end]);

        let start = DOC.find("let y = x + 1;\n```\n").unwrap() + "let y = x + 1;\n```\n".len();
        let end = DOC.find("## Tests").unwrap();
        assert_eq!(doc.solution_explanation, &DOC[start..end]);
    }

    #[test]
    fn rejects_document_without_title() {
        let err = parse_document("Just text\n\n## Description\n").unwrap_err();
        assert_eq!(err, MalformedDocument::MissingTitle);
    }

    #[test]
    fn rejects_language_mismatch() {
        let text = DOC.replacen("```javascript\nlet y", "```python\nlet y", 1);
        let err = parse_document(&text).unwrap_err();
        assert_eq!(
            err,
            MalformedDocument::SolutionLanguageMismatch { problem: "javascript".into(), solution: "python".into() }
        );
    }

    #[test]
    fn untagged_blocks_share_default_language() {
        let text = DOC.replace("```javascript\n", "```\n");
        let doc = parse_document(&text).unwrap();
        assert_eq!(doc.code_language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn rejects_missing_marker() {
        let text = DOC.replace("// Your code here\n", "");
        assert_eq!(parse_document(&text).unwrap_err(), MalformedDocument::MissingInsertionMarker);
    }

    #[test]
    fn rejects_duplicate_marker() {
        let text = DOC.replace("// Your code here\n", "// Your code here\n// Your code here\n");
        assert_eq!(
            parse_document(&text).unwrap_err(),
            MalformedDocument::MultipleInsertionMarkers { count: 2 }
        );
    }

    #[test]
    fn missing_problem_block_is_fatal() {
        let text = "# T\n\n## Description\n\nx\n\n## Problem\n\nno code here\n";
        assert_eq!(
            parse_document(text).unwrap_err(),
            MalformedDocument::MissingCodeBlock { section: "problem" }
        );
    }

    #[test]
    fn missing_hidden_tests_heading_yields_empty_list() {
        let cut = DOC.find("## Hidden Tests").unwrap();
        let doc = parse_document(&DOC[..cut]).unwrap();
        assert_eq!(doc.visible_tests.len(), 2);
        assert!(doc.hidden_tests.is_empty());
    }

    #[test]
    fn unpaired_trailing_code_stops_test_list() {
        let text = DOC.replace("## Hidden Tests", "```javascript\nreturn 5;\n```\n\n## Hidden Tests");
        let doc = parse_document(&text).unwrap();
        assert_eq!(doc.visible_tests.len(), 2);
        // The dangling probe is consumed, the next heading still starts hidden tests.
        assert_eq!(doc.hidden_tests.len(), 1);
    }

    #[test]
    fn pairing_break_ends_list_early() {
        let text = DOC.replace("2\n\n```javascript\nlet a", "- not a paragraph\n\n```javascript\nlet a");
        let doc = parse_document(&text).unwrap();
        assert!(doc.visible_tests.is_empty());
    }
}
