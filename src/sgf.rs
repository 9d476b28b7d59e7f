//! Linear SGF export and import.
//!
//! Only the main line is read: the first variation is followed wherever the
//! record branches. Setup properties (`AB`, `AW`) are ignored.

use crate::board::Color;
use crate::constants::{APP_NAME, DEFAULT_BOARD_SIZE, MAX_BOARD_SIZE};
use crate::error::SgfImportError;
use crate::position::{parse_sgf_coord, sgf_coord};
use crate::tree::{GameInfo, GameTree};

/// Serialize the path from the root to the current node.
pub fn export(tree: &GameTree) -> String {
    let size = tree.size();
    let info = &tree.info;
    let mut sgf = format!(
        "(;GM[1]FF[4]CA[UTF-8]AP[{APP_NAME}]RU[{}]KM[{}]SZ[{size}]",
        escape(&info.rules),
        info.komi
    );
    if let Some(name) = &info.black_name {
        sgf.push_str(&format!("PB[{}]", escape(name)));
    }
    if let Some(name) = &info.white_name {
        sgf.push_str(&format!("PW[{}]", escape(name)));
    }
    for played in tree.moves_from_root(tree.current()) {
        sgf.push_str(&format!(
            ";{}[{}]",
            played.color.letter(),
            sgf_coord(played.mv, size)
        ));
    }
    sgf.push_str(")\n");
    sgf
}

/// Build a fresh tree from an SGF record, current at the last move.
///
/// Fails without side effects on the first unreadable or illegal move.
pub fn import(text: &str) -> Result<GameTree, SgfImportError> {
    let mut info = GameInfo::new(DEFAULT_BOARD_SIZE);
    let mut moves = Vec::new();
    for prop in main_line(text)? {
        match prop.ident.as_str() {
            "SZ" => info.size = parse_size(&prop.value)?,
            "RU" => info.rules = prop.value,
            "KM" => match prop.value.trim().parse() {
                Ok(komi) => info.komi = komi,
                Err(_) => log::warn!("ignoring unreadable komi '{}'", prop.value),
            },
            "PB" => info.black_name = Some(prop.value),
            "PW" => info.white_name = Some(prop.value),
            "B" => moves.push((Color::Black, prop.value)),
            "W" => moves.push((Color::White, prop.value)),
            _ => {}
        }
    }

    let size = info.size;
    let mut tree = GameTree::with_info(info).map_err(|_| SgfImportError::InvalidBoardSize {
        value: size.to_string(),
    })?;
    for (i, (color, value)) in moves.into_iter().enumerate() {
        let index = i + 1;
        let mv = parse_sgf_coord(value.trim(), size)
            .ok_or(SgfImportError::InvalidCoordinate { index, value })?;
        tree.try_play(color, mv)
            .map_err(|source| SgfImportError::IllegalMove { index, source })?;
    }
    log::info!(
        "imported {size}x{size} game with {} moves",
        tree.move_number()
    );
    Ok(tree)
}

fn parse_size(value: &str) -> Result<usize, SgfImportError> {
    // Rectangular boards are written `SZ[cols:rows]`.
    let (cols, rows) = value.split_once(':').unwrap_or((value, value));
    let cols: Option<usize> = cols.trim().parse().ok();
    let rows: Option<usize> = rows.trim().parse().ok();
    match (cols, rows) {
        (Some(n), Some(m)) if n == m && (1..=MAX_BOARD_SIZE).contains(&n) => Ok(n),
        _ => Err(SgfImportError::InvalidBoardSize {
            value: value.to_string(),
        }),
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace(']', "\\]")
}

#[derive(Debug, PartialEq)]
struct Property {
    ident: String,
    value: String,
}

/// Properties of the main line in file order, one entry per value.
fn main_line(text: &str) -> Result<Vec<Property>, SgfImportError> {
    let start = text.find('(').ok_or(SgfImportError::NotSgf)?;
    let mut chars = text[start + 1..].chars();
    if !chars.by_ref().find(|c| !c.is_whitespace()).is_some_and(|c| c == ';') {
        return Err(SgfImportError::NotSgf);
    }

    let mut props = Vec::new();
    let mut ident = String::new();
    let mut after_value = false;
    while let Some(c) = chars.next() {
        match c {
            // End of the game or of the first variation.
            ')' => break,
            '(' => {}
            ';' => {
                ident.clear();
                after_value = false;
            }
            '[' => {
                let value = read_value(&mut chars).ok_or_else(|| SgfImportError::Unterminated {
                    property: ident.clone(),
                })?;
                props.push(Property {
                    ident: ident.clone(),
                    value,
                });
                after_value = true;
            }
            c if c.is_ascii_uppercase() => {
                if after_value {
                    ident.clear();
                    after_value = false;
                }
                ident.push(c);
            }
            _ => {}
        }
    }
    Ok(props)
}

/// Read up to the closing `]`, resolving `\` escapes.
fn read_value(chars: &mut std::str::Chars<'_>) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            ']' => return Some(value),
            '\\' => value.push(chars.next()?),
            c => value.push(c),
        }
    }
}
