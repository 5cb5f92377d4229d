use crate::analyzer::kubecuro::FindingCode;
use crate::error::KubecuroError;
use colored::*;

/// Print the catalog entry for one finding code.
pub fn handle_explain(code: &str) -> crate::Result<()> {
    let code = FindingCode::parse(code).ok_or_else(|| KubecuroError::UnknownCode(code.to_string()))?;
    print!("{}", explain(code));
    Ok(())
}

/// Print every finding code with its default severity.
pub fn handle_checklist() -> crate::Result<()> {
    print!("{}", checklist());
    Ok(())
}

pub fn explain(code: FindingCode) -> String {
    format!(
        "{} - {}\n\nDefault severity: {}\n\n{}\n\nRemediation: {}\n",
        code.as_str().bold(),
        code.title(),
        code.default_severity(),
        code.description(),
        code.remediation()
    )
}

pub fn checklist() -> String {
    let width = FindingCode::ALL
        .iter()
        .map(|c| c.as_str().len())
        .max()
        .unwrap_or(0);
    let mut output = String::new();
    for code in FindingCode::ALL {
        output.push_str(&format!(
            "{:<width$}  {:<6}  {}\n",
            code.as_str(),
            code.default_severity().as_str(),
            code.title(),
            width = width
        ));
    }
    output
}
