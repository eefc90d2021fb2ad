mod write_read_tests;
