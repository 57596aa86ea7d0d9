//! Function name parser
//!
//! Grammar: tokens separated by `_`, dispatched by token count and
//! recognized keywords. Named functions with multi-word names are matched
//! against a whole-name table before tokenizing.
//!
//! ```text
//! day                      on-change consumption for the open day
//! week_max                 on-change extremum for the open week
//! month_minus2             counter delta over the month before last
//! day_minus3_avg           aggregate over one whole past day
//! reading_week_minus1      point-in-time reading at last week's start
//! last_24h_max             aggregate over a trailing fixed window
//! rolling_12m_year_minus1  consumption over a trailing approximate window
//! ```

use crate::calendar::{RollingWindow, TimeUnit, WindowUnit};
use crate::descriptor::{
    DescriptorError, FunctionDescriptor, NamedSeriesFn, ParamMap, RollingKind, SampleStat,
    StaticKind,
};
use crate::query::AggregateOp;
use nom::{
    bytes::complete::tag,
    character::complete::{anychar, digit1},
    combinator::{all_consuming, map_res},
    sequence::{pair, preceded},
    IResult,
};
use serde_json::Value;

/// Parse a symbolic function name plus its raw parameters into a
/// descriptor. Pure; parsing the same name twice yields the same result.
pub fn parse(name: &str, params: &ParamMap) -> Result<FunctionDescriptor, DescriptorError> {
    let name = name.trim().to_ascii_lowercase();

    // multi-word named functions, before tokenizing
    match name.as_str() {
        "oldest_value" => return Ok(FunctionDescriptor::Static(StaticKind::OldestValue)),
        "oldest_log" => return Ok(FunctionDescriptor::Static(StaticKind::OldestLog)),
        "store_version" => return Ok(FunctionDescriptor::Static(StaticKind::StoreVersion)),
        "heating_degree_sum" => {
            return Ok(FunctionDescriptor::NamedSeries(NamedSeriesFn::HeatingDegreeSum {
                year: require_year("heating_degree_sum", params)?,
                month: optional_month(params)?,
            }))
        }
        "cooling_degree_sum" => {
            return Ok(FunctionDescriptor::NamedSeries(NamedSeriesFn::CoolingDegreeSum {
                year: require_year("cooling_degree_sum", params)?,
                month: optional_month(params)?,
            }))
        }
        "grassland_temp_sum" => {
            return Ok(FunctionDescriptor::NamedSeries(NamedSeriesFn::GrasslandTempSum {
                year: require_year("grassland_temp_sum", params)?,
            }))
        }
        "vorjahreszeitraum" => {
            return Ok(FunctionDescriptor::NamedSeries(NamedSeriesFn::PriorYearPeriod))
        }
        _ => {}
    }

    let unknown = || DescriptorError::UnknownFunction(name.clone());
    let tokens: Vec<&str> = name.split('_').collect();

    match tokens.as_slice() {
        // day / week / month / year → on-change consumption
        [unit] => {
            let unit = TimeUnit::parse(unit).map_err(|_| unknown())?;
            Ok(FunctionDescriptor::OnChange { unit, op: None })
        }

        // day_max → on-change statistic; day_minus2 → periodic counter delta
        [unit, second] => {
            let unit = TimeUnit::parse(unit).map_err(|_| unknown())?;
            if let Some(op) = sample_stat(second) {
                return Ok(FunctionDescriptor::OnChange { unit, op: Some(op) });
            }
            let offset = minus_offset(second).ok_or_else(unknown)?;
            if offset == 0 {
                return Err(unknown());
            }
            Ok(FunctionDescriptor::Periodic {
                unit,
                start: offset,
                end: offset - 1,
                op: None,
            })
        }

        // last_24h_max → trailing-window aggregate
        ["last", window, op] => {
            let window = window_token(window).ok_or_else(unknown)?;
            let op = aggregate_op(op).ok_or_else(unknown)?;
            Ok(FunctionDescriptor::Rolling(RollingKind::Last { window, op }))
        }

        // reading_week_minus1 → point-in-time meter reading
        ["reading", unit, minus] => {
            let unit = TimeUnit::parse(unit).map_err(|_| unknown())?;
            let offset = minus_offset(minus).ok_or_else(unknown)?;
            Ok(FunctionDescriptor::Periodic {
                unit,
                start: offset,
                end: offset,
                op: Some(AggregateOp::Max),
            })
        }

        // day_minus2_max → aggregate over one whole past unit
        [unit, minus, op] => {
            let unit = TimeUnit::parse(unit).map_err(|_| unknown())?;
            let offset = minus_offset(minus).ok_or_else(unknown)?;
            if offset == 0 {
                return Err(unknown());
            }
            let op = aggregate_op(op).ok_or_else(unknown)?;
            Ok(FunctionDescriptor::Periodic {
                unit,
                start: offset,
                end: offset - 1,
                op: Some(op),
            })
        }

        // rolling_12m_year_minus1 → trailing consumption at a boundary
        ["rolling", window, unit, minus] => {
            let window = window_token(window).ok_or_else(unknown)?;
            let unit = TimeUnit::parse(unit).map_err(|_| unknown())?;
            let offset = minus_offset(minus).ok_or_else(unknown)?;
            Ok(FunctionDescriptor::Rolling(RollingKind::Consumption {
                window,
                unit,
                offset,
            }))
        }

        _ => Err(unknown()),
    }
}

fn sample_stat(token: &str) -> Option<SampleStat> {
    match token {
        "min" => Some(SampleStat::Min),
        "max" => Some(SampleStat::Max),
        "avg" => Some(SampleStat::Avg),
        _ => None,
    }
}

fn aggregate_op(token: &str) -> Option<AggregateOp> {
    // compound operators contain the delimiter and can never be one token
    AggregateOp::parse(token).ok()
}

/// `minus<N>` with a decimal offset; anything else is not an offset token.
fn minus_offset(token: &str) -> Option<u32> {
    fn inner(i: &str) -> IResult<&str, u32> {
        all_consuming(preceded(tag("minus"), map_res(digit1, str::parse)))(i)
    }
    inner(token).ok().map(|(_, n)| n)
}

/// `<N><i|h|d|w|m|y>` rolling-window token.
fn window_token(token: &str) -> Option<RollingWindow> {
    fn inner(i: &str) -> IResult<&str, (u32, char)> {
        all_consuming(pair(map_res(digit1, str::parse), anychar))(i)
    }
    let (_, (count, suffix)) = inner(token).ok()?;
    let unit = WindowUnit::from_suffix(suffix)?;
    if count == 0 {
        return None;
    }
    Some(RollingWindow { count, unit })
}

fn require_year(function: &'static str, params: &ParamMap) -> Result<i32, DescriptorError> {
    let value = params.get("year").ok_or(DescriptorError::MissingParameter {
        function,
        param: "year",
    })?;
    int_param("year", value).map(|y| y as i32)
}

fn optional_month(params: &ParamMap) -> Result<Option<u32>, DescriptorError> {
    let Some(value) = params.get("month") else {
        return Ok(None);
    };
    let month = int_param("month", value)?;
    if !(1..=12).contains(&month) {
        return Err(DescriptorError::InvalidParameter {
            param: "month",
            reason: format!("{month} is not a calendar month"),
        });
    }
    Ok(Some(month as u32))
}

/// Numeric parameters arrive either as numbers or as strings.
fn int_param(param: &'static str, value: &Value) -> Result<i64, DescriptorError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DescriptorError::InvalidParameter {
        param,
        reason: format!("cannot read {value} as an integer"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_params() -> ParamMap {
        ParamMap::new()
    }

    #[test]
    fn on_change_shapes() {
        assert_eq!(
            parse("day", &no_params()).unwrap(),
            FunctionDescriptor::OnChange {
                unit: TimeUnit::Day,
                op: None
            }
        );
        assert_eq!(
            parse("week_max", &no_params()).unwrap(),
            FunctionDescriptor::OnChange {
                unit: TimeUnit::Week,
                op: Some(SampleStat::Max)
            }
        );
        assert_eq!(
            parse("year_min", &no_params()).unwrap(),
            FunctionDescriptor::OnChange {
                unit: TimeUnit::Year,
                op: Some(SampleStat::Min)
            }
        );
        assert_eq!(
            parse("month_avg", &no_params()).unwrap(),
            FunctionDescriptor::OnChange {
                unit: TimeUnit::Month,
                op: Some(SampleStat::Avg)
            }
        );
    }

    #[test]
    fn periodic_shapes() {
        assert_eq!(
            parse("month_minus2", &no_params()).unwrap(),
            FunctionDescriptor::Periodic {
                unit: TimeUnit::Month,
                start: 2,
                end: 1,
                op: None
            }
        );
        assert_eq!(
            parse("day_minus3_avg", &no_params()).unwrap(),
            FunctionDescriptor::Periodic {
                unit: TimeUnit::Day,
                start: 3,
                end: 2,
                op: Some(AggregateOp::Avg)
            }
        );
        // multi-digit offsets are valid
        assert_eq!(
            parse("week_minus12_max", &no_params()).unwrap(),
            FunctionDescriptor::Periodic {
                unit: TimeUnit::Week,
                start: 12,
                end: 11,
                op: Some(AggregateOp::Max)
            }
        );
    }

    #[test]
    fn reading_collapses_the_window() {
        assert_eq!(
            parse("reading_week_minus1", &no_params()).unwrap(),
            FunctionDescriptor::Periodic {
                unit: TimeUnit::Week,
                start: 1,
                end: 1,
                op: Some(AggregateOp::Max)
            }
        );
    }

    #[test]
    fn rolling_shapes() {
        assert_eq!(
            parse("last_24h_max", &no_params()).unwrap(),
            FunctionDescriptor::Rolling(RollingKind::Last {
                window: RollingWindow {
                    count: 24,
                    unit: WindowUnit::Hour
                },
                op: AggregateOp::Max
            })
        );
        assert_eq!(
            parse("rolling_12m_year_minus1", &no_params()).unwrap(),
            FunctionDescriptor::Rolling(RollingKind::Consumption {
                window: RollingWindow {
                    count: 12,
                    unit: WindowUnit::Month
                },
                unit: TimeUnit::Year,
                offset: 1
            })
        );
    }

    #[test]
    fn whole_name_table() {
        assert_eq!(
            parse("oldest_value", &no_params()).unwrap(),
            FunctionDescriptor::Static(StaticKind::OldestValue)
        );
        assert_eq!(
            parse("vorjahreszeitraum", &no_params()).unwrap(),
            FunctionDescriptor::NamedSeries(NamedSeriesFn::PriorYearPeriod)
        );
    }

    #[test]
    fn named_series_parameters() {
        let mut params = ParamMap::new();
        params.insert("year".into(), json!(2023));
        params.insert("month".into(), json!("7"));
        assert_eq!(
            parse("heating_degree_sum", &params).unwrap(),
            FunctionDescriptor::NamedSeries(NamedSeriesFn::HeatingDegreeSum {
                year: 2023,
                month: Some(7)
            })
        );

        assert_eq!(
            parse("grassland_temp_sum", &no_params()),
            Err(DescriptorError::MissingParameter {
                function: "grassland_temp_sum",
                param: "year"
            })
        );

        params.insert("month".into(), json!(13));
        assert!(matches!(
            parse("cooling_degree_sum", &params),
            Err(DescriptorError::InvalidParameter { param: "month", .. })
        ));
    }

    #[test]
    fn malformed_names_are_unknown_not_panics() {
        for name in [
            "",
            "fortnight",
            "day_minus",
            "day_minusx",
            "day_minus0",
            "day_median",
            "last_24x_max",
            "last_0d_max",
            "rolling_12m_minus1",
            "day_minus2_sum_max",
            "reading_day_minusx",
        ] {
            assert!(
                matches!(
                    parse(name, &no_params()),
                    Err(DescriptorError::UnknownFunction(_))
                ),
                "{name:?} should be unknown"
            );
        }
    }

    #[test]
    fn parsing_is_idempotent() {
        let a = parse("day_minus2_max", &no_params()).unwrap();
        let b = parse("day_minus2_max", &no_params()).unwrap();
        assert_eq!(a, b);
        let c = parse("DAY_minus2_MAX", &no_params()).unwrap();
        assert_eq!(a, c);
    }
}
