mod position_test;
mod tick_bitmap_test;
