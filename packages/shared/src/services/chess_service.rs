use chess::{BitBoard, Board, BoardStatus, ChessMove, MoveGen, Piece, Square, EMPTY};
use std::str::FromStr;

use crate::{
    models::{
        match_history::HistoryMove,
        move_request::MoveRequest,
        room::{Color, EndReason, GameOutcome, MoveRecord, STARTING_FEN},
    },
    services::errors::chess_service_errors::ChessServiceError,
};

/// Halfmoves without a pawn move or capture after which the game is drawn.
const FIFTY_MOVE_LIMIT: u32 = 100;

/// Result of applying one legal move to a position.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMove {
    pub mover: Color,
    pub piece: String,
    pub san: String,
    pub fen: String,
    pub hash: u64,
    pub halfmove_clock: u32,
    pub terminal: Option<GameOutcome>,
}

/// Rules oracle over the `chess` crate.
#[derive(Clone, Default)]
pub struct ChessService;

impl ChessService {
    pub fn new() -> Self {
        ChessService
    }

    pub fn initial_hash() -> u64 {
        Board::default().get_hash()
    }

    /// Validates `move_request` against `fen` and returns the resulting line.
    ///
    /// `halfmove_clock` and `position_hashes` describe the game so far; the
    /// crate's `Board` carries neither, so repetition and the fifty-move rule
    /// are judged from them.
    pub fn apply_move(
        &self,
        fen: &str,
        move_request: &MoveRequest,
        halfmove_clock: u32,
        position_hashes: &[u64],
        ply: u32,
    ) -> Result<AppliedMove, ChessServiceError> {
        let board = parse_board(fen)?;

        if board.status() != BoardStatus::Ongoing {
            return Err(ChessServiceError::GameOver(
                "Game is already over".to_string(),
            ));
        }

        let chess_move = parse_move(move_request)?;
        let legal_moves: Vec<ChessMove> = MoveGen::new_legal(&board).collect();
        if !legal_moves.contains(&chess_move) {
            return Err(ChessServiceError::IllegalMove(format!(
                "{} is not a legal move",
                move_request.to_uci()
            )));
        }

        let piece = board
            .piece_on(chess_move.get_source())
            .ok_or_else(|| ChessServiceError::InvalidPosition("No piece to move".to_string()))?;
        let capture = is_capture(&board, chess_move, piece);
        let new_board = board.make_move_new(chess_move);

        let halfmove_clock = if piece == Piece::Pawn || capture {
            0
        } else {
            halfmove_clock + 1
        };
        let mover = to_color(board.side_to_move());
        let hash = new_board.get_hash();
        let repetitions = position_hashes.iter().filter(|h| **h == hash).count() + 1;

        let terminal = match new_board.status() {
            BoardStatus::Checkmate => Some(GameOutcome {
                winner: Some(mover),
                reason: EndReason::Checkmate,
            }),
            BoardStatus::Stalemate => Some(draw(EndReason::Stalemate)),
            BoardStatus::Ongoing if insufficient_material(&new_board) => {
                Some(draw(EndReason::InsufficientMaterial))
            }
            BoardStatus::Ongoing if repetitions >= 3 => Some(draw(EndReason::ThreefoldRepetition)),
            BoardStatus::Ongoing if halfmove_clock >= FIFTY_MOVE_LIMIT => {
                Some(draw(EndReason::FiftyMoveRule))
            }
            BoardStatus::Ongoing => None,
        };

        Ok(AppliedMove {
            mover,
            piece: piece_name(piece).to_string(),
            san: san(&board, &new_board, chess_move, piece, capture, &legal_moves),
            fen: fen_with_counters(&new_board, halfmove_clock, ply / 2 + 1),
            hash,
            halfmove_clock,
            terminal,
        })
    }

    /// Legal moves of the side to move, as UCI strings.
    pub fn legal_moves(&self, fen: &str) -> Result<Vec<String>, ChessServiceError> {
        let board = parse_board(fen)?;

        let legal_moves: Vec<String> = MoveGen::new_legal(&board)
            .map(|m| m.to_string())
            .collect();

        Ok(legal_moves)
    }

    /// Replays a move log from the initial position, recomputing notation
    /// and resulting positions.
    pub fn replay(&self, move_log: &[MoveRecord]) -> Result<Vec<HistoryMove>, ChessServiceError> {
        let mut fen = STARTING_FEN.to_string();
        let mut hashes = vec![Self::initial_hash()];
        let mut halfmove_clock = 0;
        let mut moves = Vec::with_capacity(move_log.len());

        for (index, record) in move_log.iter().enumerate() {
            let request = MoveRequest {
                from_square: record.from.clone(),
                to_square: record.to.clone(),
                promotion_piece: record.promotion.clone(),
            };
            let ply = index as u32 + 1;
            let applied = self.apply_move(&fen, &request, halfmove_clock, &hashes, ply)?;

            halfmove_clock = applied.halfmove_clock;
            hashes.push(applied.hash);
            fen = applied.fen.clone();
            moves.push(HistoryMove {
                move_number: ply,
                from: record.from.clone(),
                to: record.to.clone(),
                piece: applied.piece,
                san: applied.san,
                fen: applied.fen,
                time_left_ms: record.time_left_ms,
            });
        }

        Ok(moves)
    }
}

fn parse_board(fen: &str) -> Result<Board, ChessServiceError> {
    Board::from_str(fen)
        .map_err(|e| ChessServiceError::InvalidPosition(format!("Invalid FEN: {}", e)))
}

fn parse_move(move_request: &MoveRequest) -> Result<ChessMove, ChessServiceError> {
    let from_sq = Square::from_str(&move_request.from_square.to_ascii_lowercase())
        .map_err(|_| ChessServiceError::InvalidSquare("Invalid from square".to_string()))?;
    let to_sq = Square::from_str(&move_request.to_square.to_ascii_lowercase())
        .map_err(|_| ChessServiceError::InvalidSquare("Invalid to square".to_string()))?;

    let promotion = match &move_request.promotion_piece {
        Some(p) => match p.to_ascii_lowercase().as_str() {
            "q" => Some(Piece::Queen),
            "r" => Some(Piece::Rook),
            "b" => Some(Piece::Bishop),
            "n" => Some(Piece::Knight),
            _ => {
                return Err(ChessServiceError::IllegalMove(
                    "Invalid promotion piece".to_string(),
                ))
            }
        },
        None => None,
    };

    Ok(ChessMove::new(from_sq, to_sq, promotion))
}

fn to_color(color: chess::Color) -> Color {
    match color {
        chess::Color::White => Color::White,
        chess::Color::Black => Color::Black,
    }
}

fn draw(reason: EndReason) -> GameOutcome {
    GameOutcome {
        winner: None,
        reason,
    }
}

fn piece_name(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "pawn",
        Piece::Knight => "knight",
        Piece::Bishop => "bishop",
        Piece::Rook => "rook",
        Piece::Queen => "queen",
        Piece::King => "king",
    }
}

fn piece_letter(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "",
        Piece::Knight => "N",
        Piece::Bishop => "B",
        Piece::Rook => "R",
        Piece::Queen => "Q",
        Piece::King => "K",
    }
}

fn is_capture(board: &Board, chess_move: ChessMove, piece: Piece) -> bool {
    let source = chess_move.get_source();
    let dest = chess_move.get_dest();
    // En passant lands on an empty square on another file.
    board.piece_on(dest).is_some()
        || (piece == Piece::Pawn && source.get_file() != dest.get_file())
}

fn san(
    board: &Board,
    new_board: &Board,
    chess_move: ChessMove,
    piece: Piece,
    capture: bool,
    legal_moves: &[ChessMove],
) -> String {
    let source = chess_move.get_source();
    let dest = chess_move.get_dest();
    let file_delta = dest.get_file().to_index() as i32 - source.get_file().to_index() as i32;

    let mut san = if piece == Piece::King && file_delta.abs() == 2 {
        if file_delta > 0 { "O-O" } else { "O-O-O" }.to_string()
    } else {
        let mut san = piece_letter(piece).to_string();
        if piece == Piece::Pawn {
            if capture {
                san.push_str(&square_file(source));
            }
        } else {
            san.push_str(&disambiguation(board, chess_move, piece, legal_moves));
        }
        if capture {
            san.push('x');
        }
        san.push_str(&dest.to_string());
        if let Some(promotion) = chess_move.get_promotion() {
            san.push('=');
            san.push_str(piece_letter(promotion));
        }
        san
    };

    if new_board.status() == BoardStatus::Checkmate {
        san.push('#');
    } else if *new_board.checkers() != EMPTY {
        san.push('+');
    }
    san
}

fn square_file(square: Square) -> String {
    square.to_string()[0..1].to_string()
}

fn square_rank(square: Square) -> String {
    square.to_string()[1..2].to_string()
}

fn disambiguation(
    board: &Board,
    chess_move: ChessMove,
    piece: Piece,
    legal_moves: &[ChessMove],
) -> String {
    let source = chess_move.get_source();
    let rivals: Vec<Square> = legal_moves
        .iter()
        .filter(|m| {
            m.get_dest() == chess_move.get_dest()
                && m.get_source() != source
                && board.piece_on(m.get_source()) == Some(piece)
        })
        .map(|m| m.get_source())
        .collect();

    if rivals.is_empty() {
        String::new()
    } else if rivals.iter().all(|s| s.get_file() != source.get_file()) {
        square_file(source)
    } else if rivals.iter().all(|s| s.get_rank() != source.get_rank()) {
        square_rank(source)
    } else {
        source.to_string()
    }
}

fn insufficient_material(board: &Board) -> bool {
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy != EMPTY {
        return false;
    }

    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops: BitBoard = *board.pieces(Piece::Bishop);
    let minors = knights + bishops.popcnt();

    if minors <= 1 {
        return true;
    }
    if knights > 0 {
        return false;
    }
    // Only bishops left: drawn when they all share a square colour.
    let mut shades = bishops.map(|sq| (sq.get_file().to_index() + sq.get_rank().to_index()) % 2);
    match shades.next() {
        Some(first) => shades.all(|shade| shade == first),
        None => true,
    }
}

/// The crate prints placeholder move counters; the game's own are substituted.
fn fen_with_counters(board: &Board, halfmove_clock: u32, fullmove: u32) -> String {
    let printed = board.to_string();
    let placement: Vec<&str> = printed.split_whitespace().take(4).collect();
    format!("{} {} {}", placement.join(" "), halfmove_clock, fullmove)
}
