//! grid.rs
//!
//! Модель сетки события: система координат, нумерация и подписи квадратов.
//!
//! - координаты `(grid_x, grid_y)` нулевые, `grid_x` — колонка, `grid_y` — ряд;
//! - `square_number` единичный, построчно слева направо;
//! - подпись позиции — буква колонки + номер ряда ("A1", "C7", "AB3").

/// Буквенная подпись колонки: A..Z, затем AA, AB и так далее.
pub fn column_label(col: u32) -> String {
    let mut n = col + 1;
    let mut label = String::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    label
}

/// Подпись позиции квадрата, номер ряда единичный.
pub fn position_label(grid_x: u32, grid_y: u32) -> String {
    format!("{}{}", column_label(grid_x), grid_y + 1)
}

/// Построчный (row-major) номер квадрата, начиная с 1.
///
/// Считает в u64: произведение двух u32 не обязано помещаться в u32.
pub fn square_number(cols: u32, grid_x: u32, grid_y: u32) -> u64 {
    grid_y as u64 * cols as u64 + grid_x as u64 + 1
}

/// Одна ячейка сетки, подготовленная для массовой вставки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub grid_x: u32,
    pub grid_y: u32,
    pub square_number: u64,
    pub position: String,
}

/// Полный набор ячеек для сетки cols × rows, в порядке нумерации.
pub fn generate_cells(cols: u32, rows: u32) -> Vec<GridCell> {
    let mut cells = Vec::with_capacity(cols as usize * rows as usize);
    for y in 0..rows {
        for x in 0..cols {
            cells.push(GridCell {
                grid_x: x,
                grid_y: y,
                square_number: square_number(cols, x, y),
                position: position_label(x, y),
            });
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_labels_are_spreadsheet_style() {
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(11), "L");
        assert_eq!(column_label(25), "Z");
        assert_eq!(column_label(26), "AA");
        assert_eq!(column_label(27), "AB");
        assert_eq!(column_label(51), "AZ");
        assert_eq!(column_label(52), "BA");
    }

    #[test]
    fn position_labels_combine_column_and_row() {
        assert_eq!(position_label(0, 0), "A1");
        assert_eq!(position_label(2, 6), "C7");
        assert_eq!(position_label(11, 11), "L12");
    }

    #[test]
    fn square_numbers_are_row_major_from_one() {
        // Сетка 3x3: верхний ряд 1..3, нижний 7..9.
        assert_eq!(square_number(3, 0, 0), 1);
        assert_eq!(square_number(3, 2, 0), 3);
        assert_eq!(square_number(3, 0, 1), 4);
        assert_eq!(square_number(3, 2, 2), 9);
    }

    #[test]
    fn square_numbers_do_not_wrap_on_huge_grids() {
        // 65536 * 65536 не помещается в u32; номер обязан остаться точным.
        assert_eq!(square_number(65_536, 65_535, 65_535), 4_294_967_296);
        assert_eq!(
            square_number(u32::MAX, u32::MAX - 1, u32::MAX - 1),
            (u32::MAX as u64 - 1) * u32::MAX as u64 + u32::MAX as u64
        );
    }

    #[test]
    fn generate_cells_covers_whole_grid_once() {
        let cells = generate_cells(12, 12);
        assert_eq!(cells.len(), 144);

        let mut numbers: Vec<u64> = cells.iter().map(|c| c.square_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 144);
        assert_eq!(numbers.first(), Some(&1));
        assert_eq!(numbers.last(), Some(&144));

        assert_eq!(cells[0].position, "A1");
        assert_eq!(cells[143].position, "L12");
    }

    #[test]
    fn generate_cells_empty_grid() {
        assert!(generate_cells(0, 5).is_empty());
        assert!(generate_cells(5, 0).is_empty());
    }
}
