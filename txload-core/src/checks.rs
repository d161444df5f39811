use std::str::FromStr;

use serde_json::Value as Json;

use crate::{Outcome, Protocol, RawStatus};

/// A pure predicate over an outcome. Never panics; anything missing or ill-shaped is `false`.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckPredicate {
    /// 2xx for HTTP, `OK` for gRPC.
    StatusIsSuccess,
    /// A non-null value exists at the dotted path. The empty path is the whole body.
    HasField(String),
    /// A value exists at the path and differs from `sentinel`.
    FieldNotEqual { path: String, sentinel: Json },
    /// The HTTP status is one of the listed codes.
    StatusIn(Vec<u16>),
}

impl CheckPredicate {
    pub fn eval(&self, outcome: &Outcome) -> bool {
        match self {
            Self::StatusIsSuccess => outcome.status.is_success(),
            Self::HasField(path) => lookup(outcome.body.as_ref(), path).is_some(),
            Self::FieldNotEqual { path, sentinel } => {
                lookup(outcome.body.as_ref(), path).is_some_and(|v| v != sentinel)
            }
            Self::StatusIn(codes) => {
                matches!(outcome.status, RawStatus::Http(code) if codes.contains(&code))
            }
        }
    }
}

/// Parses `status_success`, `has_field(path)`, `field_not_equal(path, value)` and
/// `status_in(code, ...)`. A sentinel that is not valid JSON is taken as a string.
impl FromStr for CheckPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, args) = match s.split_once('(') {
            Some((name, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("missing `)` in `{s}`"))?;
                (name.trim(), Some(args.trim()))
            }
            None => (s, None),
        };

        match (name, args) {
            ("status_success", None | Some("")) => Ok(Self::StatusIsSuccess),
            ("has_field", path) => Ok(Self::HasField(path.unwrap_or_default().to_string())),
            ("field_not_equal", Some(args)) => {
                let (path, sentinel) = args
                    .split_once(',')
                    .ok_or_else(|| "field_not_equal expects (path, value)".to_string())?;
                let sentinel = sentinel.trim();
                let sentinel = serde_json::from_str(sentinel)
                    .unwrap_or_else(|_| Json::from(sentinel.to_string()));
                Ok(Self::FieldNotEqual {
                    path: path.trim().to_string(),
                    sentinel,
                })
            }
            ("status_in", Some(args)) => {
                let codes = args
                    .split(',')
                    .map(|c| {
                        c.trim()
                            .parse::<u16>()
                            .map_err(|_| format!("invalid status code `{}`", c.trim()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if codes.is_empty() {
                    return Err("status_in needs at least one code".to_string());
                }
                Ok(Self::StatusIn(codes))
            }
            _ => Err(format!("unknown check predicate `{s}`")),
        }
    }
}

/// Dotted-path lookup. Numeric segments index arrays. JSON `null` counts as absent.
fn lookup<'a>(body: Option<&'a Json>, path: &str) -> Option<&'a Json> {
    let mut cur = body?;
    for seg in path.split('.').filter(|s| !s.is_empty()) {
        cur = match cur {
            Json::Object(map) => map.get(seg)?,
            Json::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!cur.is_null()).then_some(cur)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub predicate: CheckPredicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: CheckPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

/// `name=predicate`. The name is everything before the first `=`.
impl FromStr for Check {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, predicate) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=PREDICATE, got `{s}`"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("check name is empty in `{s}`"));
        }
        Ok(Self::new(name, predicate.parse()?))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new(checks: Vec<Check>) -> Self {
        Self { checks }
    }

    /// `status is 2xx` and `response not error`.
    pub fn http_default() -> Self {
        Self::new(vec![
            Check::new("status is 2xx", CheckPredicate::StatusIsSuccess),
            Check::new(
                "response not error",
                CheckPredicate::FieldNotEqual {
                    path: "status".to_string(),
                    sentinel: Json::from("error"),
                },
            ),
        ])
    }

    /// `status OK` and `has response`.
    pub fn grpc_default() -> Self {
        Self::new(vec![
            Check::new("status OK", CheckPredicate::StatusIsSuccess),
            Check::new("has response", CheckPredicate::HasField(String::new())),
        ])
    }

    pub fn default_for(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Http => Self::http_default(),
            Protocol::Grpc => Self::grpc_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn validate(&self, outcome: &Outcome) -> Vec<(String, bool)> {
        self.checks
            .iter()
            .map(|c| (c.name.clone(), c.predicate.eval(outcome)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use txload_grpc::Code;

    fn http(status: u16, body: Option<Json>) -> Outcome {
        Outcome::new(RawStatus::Http(status), Duration::from_millis(3), body)
    }

    #[test]
    fn http_defaults_pass_on_ok_body() {
        let checks = CheckSet::http_default();
        let res = checks.validate(&http(200, Some(json!({"status": "ok", "id": "T1"}))));
        assert_eq!(
            res,
            vec![
                ("status is 2xx".to_string(), true),
                ("response not error".to_string(), true)
            ]
        );
    }

    #[test]
    fn error_sentinel_and_missing_body_fail() {
        let checks = CheckSet::http_default();

        let res = checks.validate(&http(200, Some(json!({"status": "error"}))));
        assert!(res[0].1);
        assert!(!res[1].1);

        let res = checks.validate(&http(502, None));
        assert!(res.iter().all(|(_, ok)| !ok));

        let res = checks.validate(&http(200, Some(json!(["not", "an", "object"]))));
        assert!(!res[1].1);
    }

    #[test]
    fn grpc_defaults_need_ok_and_body() {
        let checks = CheckSet::grpc_default();
        let ok = Outcome::new(
            RawStatus::Grpc(Code::Ok),
            Duration::ZERO,
            Some(json!({"payment_id": "pay_1"})),
        );
        assert!(checks.validate(&ok).iter().all(|(_, v)| *v));

        let failed = Outcome::new(RawStatus::Grpc(Code::Internal), Duration::ZERO, None);
        assert!(checks.validate(&failed).iter().all(|(_, v)| !*v));
    }

    #[test]
    fn paths_walk_objects_and_arrays() {
        let o = http(
            201,
            Some(json!({"data": {"items": [{"id": "a"}, {"id": null}]}})),
        );
        let has = |p: &str| CheckPredicate::HasField(p.to_string()).eval(&o);
        assert!(has("data.items.0.id"));
        assert!(!has("data.items.1.id"));
        assert!(!has("data.items.7"));
        assert!(!has("data.items.x"));
        assert!(!has("data.missing"));

        assert!(CheckPredicate::StatusIn(vec![200, 201]).eval(&o));
        assert!(!CheckPredicate::StatusIn(vec![500]).eval(&o));
        assert!(!CheckPredicate::StatusIn(vec![200]).eval(&Outcome::no_data()));
    }

    #[test]
    fn checks_parse_from_flags() {
        let check: Check = "payments 2xx/5xx=status_in(200, 500)"
            .parse()
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(check.name, "payments 2xx/5xx");
        assert_eq!(check.predicate, CheckPredicate::StatusIn(vec![200, 500]));
        assert!(check.predicate.eval(&http(500, None)));
        assert!(!check.predicate.eval(&http(404, None)));

        let parse = |s: &str| s.parse::<CheckPredicate>();
        assert_eq!(parse("status_success"), Ok(CheckPredicate::StatusIsSuccess));
        assert_eq!(parse("has_field"), Ok(CheckPredicate::HasField(String::new())));
        assert_eq!(
            parse("has_field(data.id)"),
            Ok(CheckPredicate::HasField("data.id".to_string()))
        );
        assert_eq!(
            parse("field_not_equal(status, error)"),
            Ok(CheckPredicate::FieldNotEqual {
                path: "status".to_string(),
                sentinel: json!("error"),
            })
        );
        assert_eq!(
            parse("field_not_equal(code, 7)"),
            Ok(CheckPredicate::FieldNotEqual {
                path: "code".to_string(),
                sentinel: json!(7),
            })
        );

        assert!(parse("status_in()").is_err());
        assert!(parse("status_in(2xx)").is_err());
        assert!(parse("field_not_equal(status)").is_err());
        assert!(parse("has_field(a").is_err());
        assert!(parse("is_fast").is_err());
        assert!("status_success".parse::<Check>().is_err());
        assert!(" =status_success".parse::<Check>().is_err());
    }
}
