//! Slash-command prompt.
//!
//! Holds the line being typed after `/` and whether the prompt is open.


/// Where key presses go.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Keys map straight to panel commands.
    #[default]
    Keys,

    /// Keys edit the prompt line.
    Prompt,
}


/// Line editor for the prompt. `cursor` is a byte offset on a char boundary.
#[derive( Debug, Default )]
pub struct PromptLine {
    text: String,
    cursor: usize,
}


impl PromptLine {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn insert( &mut self, c: char ) {
        self.text.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Removes the character before the cursor.
    pub fn backspace( &mut self ) {
        if let Some( prev ) = self.prev_boundary() {
            self.text.remove( prev );
            self.cursor = prev;
        }
    }


    pub fn move_left( &mut self ) {
        if let Some( prev ) = self.prev_boundary() {
            self.cursor = prev;
        }
    }


    pub fn move_right( &mut self ) {
        if let Some( c ) = self.text[ self.cursor.. ].chars().next() {
            self.cursor += c.len_utf8();
        }
    }


    fn prev_boundary( &self ) -> Option<usize> {
        self.text[ ..self.cursor ].char_indices().next_back().map( |( i, _ )| i )
    }


    /// Returns the typed line and clears the editor.
    pub fn take( &mut self ) -> String {
        self.cursor = 0;
        std::mem::take( &mut self.text )
    }


    pub fn clear( &mut self ) {
        self.text.clear();
        self.cursor = 0;
    }


    pub fn text( &self ) -> &str {
        &self.text
    }


    /// Cursor column in characters, for placing the terminal cursor.
    pub fn cursor_col( &self ) -> usize {
        self.text[ ..self.cursor ].chars().count()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_edit_and_take() {
        let mut line = PromptLine::new();
        for c in "vol 4".chars() {
            line.insert( c );
        }
        line.insert( '0' );
        assert_eq!( line.text(), "vol 40" );

        line.backspace();
        line.move_left();
        line.insert( '8' );
        assert_eq!( line.text(), "vol 84" );
        assert_eq!( line.cursor_col(), 5 );

        assert_eq!( line.take(), "vol 84" );
        assert_eq!( line.text(), "" );
        assert_eq!( line.cursor_col(), 0 );
    }


    #[test]
    fn test_multibyte_cursor() {
        let mut line = PromptLine::new();
        line.insert( 'é' );
        line.insert( 'x' );
        line.move_left();
        line.move_left();
        assert_eq!( line.cursor_col(), 0 );

        line.move_right();
        line.backspace();
        assert_eq!( line.text(), "x" );
    }


    #[test]
    fn test_backspace_at_start_is_noop() {
        let mut line = PromptLine::new();
        line.backspace();
        line.move_left();
        assert_eq!( line.text(), "" );
    }
}
