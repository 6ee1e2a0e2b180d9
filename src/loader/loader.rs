use std::fs;

use regex::Regex;
use thiserror::Error;

use crate::cpu::CPUConfig;
use crate::instructions::instructions::{OpClass, Program, RawInstr, RegisterType};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Can't read '{path}': {source}")]
    IOError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: expected '<address> <op class> <dest> <src1> <src2>', found '{text}'")]
    ParseError { line: usize, text: String },
    #[error("Line {line}: {msg}")]
    AnalysisError { line: usize, msg: String },
}

// <hex address> <op class> <dest reg> <src1 reg> <src2 reg>
const TRACE_LINE: &str = r"^\s*(?:0[xX])?([0-9a-fA-F]+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)\s*$";

struct Loader {
    register_count: u16,
    line_regex: Regex,
    code: Vec<RawInstr>,
}

impl Loader {
    fn load(&mut self, src: &str) -> Result<(), LoadError> {
        for (index, text) in src.lines().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            let instr = self.parse_line(index + 1, text)?;
            self.code.push(instr);
        }
        Ok(())
    }

    fn parse_line(&self, line: usize, text: &str) -> Result<RawInstr, LoadError> {
        let parse_error = || LoadError::ParseError { line, text: text.trim().to_string() };

        let captures = self.line_regex.captures(text).ok_or_else(parse_error)?;
        let address = u64::from_str_radix(&captures[1], 16).map_err(|_| parse_error())?;
        let mut fields = [0i64; 4];
        for (k, field) in fields.iter_mut().enumerate() {
            *field = captures[k + 2].parse().map_err(|_| parse_error())?;
        }

        let op_class = match OpClass::from_code(fields[0]) {
            Some(op_class) => op_class,
            None => return Err(LoadError::AnalysisError {
                line,
                msg: format!("Unknown op class {}", fields[0]),
            }),
        };

        Ok(RawInstr {
            address,
            op_class,
            dest_reg: self.parse_register(line, fields[1])?,
            src_reg: [self.parse_register(line, fields[2])?, self.parse_register(line, fields[3])?],
        })
    }

    // -1 means the operand is not used.
    fn parse_register(&self, line: usize, value: i64) -> Result<Option<RegisterType>, LoadError> {
        if value == -1 {
            return Ok(None);
        }

        if value < 0 || value >= self.register_count as i64 {
            return Err(LoadError::AnalysisError {
                line,
                msg: format!("Register {} is out of range [0, {})", value, self.register_count),
            });
        }

        Ok(Some(value as RegisterType))
    }
}

pub(crate) fn load_from_string(cpu_config: &CPUConfig, src: &str) -> Result<Program, LoadError> {
    let mut loader = Loader {
        register_count: cpu_config.register_count,
        line_regex: Regex::new(TRACE_LINE).expect("trace line pattern is valid"),
        code: Vec::new(),
    };

    loader.load(src)?;
    Ok(Program::new(loader.code))
}

pub(crate) fn load(cpu_config: &CPUConfig, path: &str) -> Result<Program, LoadError> {
    let src = fs::read_to_string(path).map_err(|source| LoadError::IOError {
        path: path.to_string(),
        source,
    })?;

    load_from_string(cpu_config, &src)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_src(src: &str) -> Result<Program, LoadError> {
        load_from_string(&CPUConfig::default(), src)
    }

    #[test]
    fn test_load() {
        let src = r#"
ab120024 0 1 2 3
0xab120028 2 -1 4 -1

ab12002c -1 5 -1 -1
"#;
        let program = load_src(src).unwrap();
        assert_eq!(program.code.len(), 3);

        assert_eq!(program.code[0], RawInstr {
            address: 0xab120024,
            op_class: OpClass::K0,
            dest_reg: Some(1),
            src_reg: [Some(2), Some(3)],
        });
        assert_eq!(program.code[1].op_class, OpClass::K2);
        assert_eq!(program.code[1].dest_reg, None);
        assert_eq!(program.code[1].src_reg, [Some(4), None]);
        assert_eq!(program.code[2].op_class, OpClass::K1);
        assert_eq!(program.code[2].address, 0xab12002c);
    }

    #[test]
    fn test_malformed_line() {
        let src = "ab120024 0 1 2 3\nab120028 0 1 2\n";
        match load_src(src) {
            Err(LoadError::ParseError { line, text }) => {
                assert_eq!(line, 2);
                assert_eq!(text, "ab120028 0 1 2");
            }
            _ => panic!("expected a ParseError"),
        }
    }

    #[test]
    fn test_register_out_of_range() {
        match load_src("ab120024 0 64 2 3\n") {
            Err(LoadError::AnalysisError { line, .. }) => assert_eq!(line, 1),
            _ => panic!("expected an AnalysisError"),
        }
        assert!(load_src("ab120024 0 1 -2 3\n").is_err());
    }

    #[test]
    fn test_unknown_op_class() {
        let err = load_src("ab120024 3 1 2 3\n").err().unwrap();
        assert_eq!(err.to_string(), "Line 1: Unknown op class 3");
    }

    #[test]
    fn test_missing_file() {
        let result = load(&CPUConfig::default(), "/nonexistent/trace.txt");
        assert!(matches!(result, Err(LoadError::IOError { .. })));
    }
}
